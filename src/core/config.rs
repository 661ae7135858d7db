use serde::{Deserialize, Serialize};

use crate::error::{CsvError, Result};

/// Line terminator written after every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineTerminator {
    /// `\r\n`, as mandated by RFC 4180.
    #[default]
    Crlf,
    /// `\n`.
    Lf,
}

impl LineTerminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::Crlf => "\r\n",
            LineTerminator::Lf => "\n",
        }
    }
}

/// How collection indices appear in column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexNotation {
    /// Zero-based bracket suffix: `tags[0]`, `items[1].name`.
    #[default]
    Bracket,
    /// One-based ordinal segment joined with the path separator: `tags.1`, `items.2.name`.
    FlattenByCount,
}

/// How a null value is written to a cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullRepresentation {
    /// An empty, unquoted field.
    #[default]
    Empty,
    /// A fixed marker such as `NULL` or `\N`, written unquoted.
    Sentinel(String),
}

/// What happens when a collection is shorter than the columns reserved for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaggedCollections {
    /// Reserved columns past the end of a shorter collection are written as null.
    #[default]
    Pad,
    /// Every record must have exactly the collection lengths of the header.
    Forbid,
}

/// Dialect and layout options of a CSV session.
///
/// All fields have defaults, so partial JSON documents are accepted by
/// [`CsvConfig::from_json`]:
///
/// ```
/// use flatcsv::core::config::{CsvConfig, LineTerminator, NullRepresentation};
///
/// let config = CsvConfig::from_json(r#"{
///     "delimiter": ";",
///     "line_terminator": "LF",
///     "null_representation": { "sentinel": "NULL" }
/// }"#).unwrap();
///
/// assert_eq!(config.delimiter, ';');
/// assert_eq!(config.line_terminator, LineTerminator::Lf);
/// assert_eq!(config.null_representation, NullRepresentation::Sentinel("NULL".to_string()));
/// assert!(config.include_header);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: char,
    pub quote: char,
    pub line_terminator: LineTerminator,
    pub include_header: bool,
    /// Joins field names of nested records: `address.city`.
    pub path_separator: String,
    pub index_notation: IndexNotation,
    /// Write empty strings as `""` so they stay distinct from null.
    pub quote_empty_strings: bool,
    pub null_representation: NullRepresentation,
    pub ragged_collections: RaggedCollections,
    /// Number of malformed rows a decode session may skip before failing.
    pub skip_limit: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            line_terminator: LineTerminator::Crlf,
            include_header: true,
            path_separator: ".".to_string(),
            index_notation: IndexNotation::Bracket,
            quote_empty_strings: false,
            null_representation: NullRepresentation::Empty,
            ragged_collections: RaggedCollections::Pad,
            skip_limit: 0,
        }
    }
}

impl CsvConfig {
    /// Parses and validates a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CsvConfig =
            serde_json::from_str(json).map_err(|e| CsvError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the dialect can be written and read back unambiguously.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter == self.quote {
            return Err(CsvError::Configuration(format!(
                "delimiter and quote must differ, both are {:?}",
                self.delimiter
            )));
        }
        for (name, c) in [("delimiter", self.delimiter), ("quote", self.quote)] {
            if c == '\r' || c == '\n' {
                return Err(CsvError::Configuration(format!(
                    "{name} cannot be a line terminator character"
                )));
            }
        }

        if self.path_separator.is_empty() {
            return Err(CsvError::Configuration(
                "path separator cannot be empty".to_string(),
            ));
        }
        if self.path_separator.contains(self.delimiter) || self.path_separator.contains(self.quote)
        {
            return Err(CsvError::Configuration(format!(
                "path separator {:?} cannot contain the delimiter or the quote",
                self.path_separator
            )));
        }
        if self.index_notation == IndexNotation::Bracket
            && self.path_separator.contains(['[', ']'])
        {
            return Err(CsvError::Configuration(format!(
                "path separator {:?} cannot contain brackets with bracket notation",
                self.path_separator
            )));
        }

        if let NullRepresentation::Sentinel(sentinel) = &self.null_representation {
            if sentinel.is_empty() {
                return Err(CsvError::Configuration(
                    "null sentinel cannot be empty, use the empty representation instead"
                        .to_string(),
                ));
            }
            if sentinel.contains([self.delimiter, self.quote, '\r', '\n']) {
                return Err(CsvError::Configuration(format!(
                    "null sentinel {sentinel:?} would need quoting"
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn null_sentinel(&self) -> Option<&str> {
        match &self.null_representation {
            NullRepresentation::Empty => None,
            NullRepresentation::Sentinel(sentinel) => Some(sentinel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_rfc_4180() {
        let config = CsvConfig::default();

        assert_eq!(config.delimiter, ',');
        assert_eq!(config.quote, '"');
        assert_eq!(config.line_terminator.as_str(), "\r\n");
        assert!(config.include_header);
        assert_eq!(config.path_separator, ".");
        assert_eq!(config.index_notation, IndexNotation::Bracket);
        assert!(!config.quote_empty_strings);
        assert_eq!(config.null_representation, NullRepresentation::Empty);
        assert_eq!(config.ragged_collections, RaggedCollections::Pad);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config = CsvConfig::from_json("{}").unwrap();
        assert_eq!(config, CsvConfig::default());
    }

    #[test]
    fn enums_use_readable_names() {
        let config = CsvConfig::from_json(
            r#"{"index_notation": "flatten_by_count", "ragged_collections": "forbid", "include_header": false}"#,
        )
        .unwrap();

        assert_eq!(config.index_notation, IndexNotation::FlattenByCount);
        assert_eq!(config.ragged_collections, RaggedCollections::Forbid);
        assert!(!config.include_header);
    }

    #[test]
    fn same_delimiter_and_quote_is_rejected() {
        let config = CsvConfig {
            quote: ',',
            ..CsvConfig::default()
        };
        assert!(matches!(config.validate(), Err(CsvError::Configuration(_))));
    }

    #[test]
    fn newline_delimiter_is_rejected() {
        let config = CsvConfig {
            delimiter: '\n',
            ..CsvConfig::default()
        };
        assert!(matches!(config.validate(), Err(CsvError::Configuration(_))));
    }

    #[test]
    fn separator_with_brackets_is_rejected_in_bracket_notation() {
        let mut config = CsvConfig {
            path_separator: "[".to_string(),
            ..CsvConfig::default()
        };
        assert!(config.validate().is_err());

        config.index_notation = IndexNotation::FlattenByCount;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sentinel_must_not_need_quoting() {
        let config = CsvConfig {
            null_representation: NullRepresentation::Sentinel("N,A".to_string()),
            ..CsvConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CsvConfig {
            null_representation: NullRepresentation::Sentinel(String::new()),
            ..CsvConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_json_is_a_configuration_error() {
        let result = CsvConfig::from_json(r#"{"delimiter": "too long"}"#);
        assert!(matches!(result, Err(CsvError::Configuration(_))));
    }
}
