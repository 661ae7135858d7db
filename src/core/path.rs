use std::fmt::Write as _;

use crate::core::config::{CsvConfig, IndexNotation};

/// One step from a record into its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named member of a record or a key of a map.
    Field(String),
    /// The zero-based position of an element in a collection.
    Index(usize),
}

impl Segment {
    /// True for a field name that a header line would read back as an index,
    /// such as the map key `1` under flatten-by-count or `k[0]` under brackets.
    pub(crate) fn reads_as_index(&self, style: &PathStyle) -> bool {
        let Segment::Field(name) = self else {
            return false;
        };
        match style.notation {
            IndexNotation::Bracket => {
                let mut segments = Vec::new();
                parse_bracket_part(name, &mut segments);
                segments.iter().any(|segment| matches!(segment, Segment::Index(_)))
            }
            IndexNotation::FlattenByCount => parse_ordinal(name).is_some(),
        }
    }
}

/// The location of one leaf value inside a nested record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ColumnPath {
    segments: Vec<Segment>,
}

impl ColumnPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &ColumnPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub(crate) fn prefix(&self, len: usize) -> ColumnPath {
        ColumnPath {
            segments: self.segments[..len].to_vec(),
        }
    }

    /// Renders the path as a flat column name.
    pub fn render(&self, style: &PathStyle) -> String {
        let mut name = String::new();
        for segment in &self.segments {
            match (segment, style.notation) {
                (Segment::Field(field), _) => {
                    if !name.is_empty() {
                        name.push_str(&style.separator);
                    }
                    name.push_str(field);
                }
                (Segment::Index(index), IndexNotation::Bracket) => {
                    let _ = write!(name, "[{index}]");
                }
                (Segment::Index(index), IndexNotation::FlattenByCount) => {
                    if !name.is_empty() {
                        name.push_str(&style.separator);
                    }
                    let _ = write!(name, "{}", index + 1);
                }
            }
        }
        name
    }

    /// Parses a column name produced by [`ColumnPath::render`].
    ///
    /// Names that were never rendered by this crate are still accepted: any
    /// part that does not look like an index is a field name.
    pub fn parse(name: &str, style: &PathStyle) -> ColumnPath {
        let mut segments = Vec::new();
        if name.is_empty() {
            return ColumnPath { segments };
        }

        for part in name.split(style.separator.as_str()) {
            match style.notation {
                IndexNotation::Bracket => parse_bracket_part(part, &mut segments),
                IndexNotation::FlattenByCount => match parse_ordinal(part) {
                    Some(index) => segments.push(Segment::Index(index)),
                    None => segments.push(Segment::Field(part.to_string())),
                },
            }
        }
        ColumnPath { segments }
    }
}

/// Reads a 1-based ordinal such as `2` as the index it stands for.
fn parse_ordinal(part: &str) -> Option<usize> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match part.parse::<usize>() {
        Ok(ordinal) if ordinal > 0 => Some(ordinal - 1),
        _ => None,
    }
}

/// Splits `name[0][1]` into a field and its trailing indices.
fn parse_bracket_part(part: &str, segments: &mut Vec<Segment>) {
    let mut indices = Vec::new();
    let mut rest = part;

    while let Some(stripped) = rest.strip_suffix(']') {
        let Some(open) = stripped.rfind('[') else {
            break;
        };
        let digits = &stripped[open + 1..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        match digits.parse::<usize>() {
            Ok(index) => indices.push(index),
            Err(_) => break,
        }
        rest = &stripped[..open];
    }

    if !rest.is_empty() || indices.is_empty() {
        segments.push(Segment::Field(rest.to_string()));
    }
    segments.extend(indices.into_iter().rev().map(Segment::Index));
}

/// The rendering options of column names, extracted from a [`CsvConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStyle {
    pub separator: String,
    pub notation: IndexNotation,
}

impl From<&CsvConfig> for PathStyle {
    fn from(config: &CsvConfig) -> Self {
        Self {
            separator: config.path_separator.clone(),
            notation: config.index_notation,
        }
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        PathStyle::from(&CsvConfig::default())
    }
}

/// Tracks where the encoder currently is inside the record being flattened.
#[derive(Debug, Default)]
pub struct PathBuilder {
    stack: Vec<Segment>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, segment: Segment) {
        self.stack.push(segment);
    }

    pub fn exit(&mut self) -> Option<Segment> {
        self.stack.pop()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&self) -> ColumnPath {
        ColumnPath::new(self.stack.clone())
    }

    pub fn current_path(&self, style: &PathStyle) -> String {
        ColumnPath::new(self.stack.clone()).render(style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Segment {
        Segment::Field(name.to_string())
    }

    fn by_count() -> PathStyle {
        PathStyle {
            separator: ".".to_string(),
            notation: IndexNotation::FlattenByCount,
        }
    }

    #[test]
    fn nested_fields_are_joined_with_separator() {
        let mut builder = PathBuilder::new();
        builder.enter(field("address"));
        builder.enter(field("city"));

        assert_eq!(builder.current_path(&PathStyle::default()), "address.city");

        builder.exit();
        builder.enter(field("zip"));
        assert_eq!(builder.current_path(&PathStyle::default()), "address.zip");
        assert_eq!(builder.depth(), 2);
    }

    #[test]
    fn indices_use_bracket_suffix() {
        let mut builder = PathBuilder::new();
        builder.enter(field("items"));
        builder.enter(Segment::Index(1));
        builder.enter(field("name"));

        assert_eq!(builder.current_path(&PathStyle::default()), "items[1].name");
    }

    #[test]
    fn indices_are_one_based_ordinals_when_flattened_by_count() {
        let path = ColumnPath::new(vec![field("tags"), Segment::Index(0)]);
        assert_eq!(path.render(&by_count()), "tags.1");

        let path = ColumnPath::new(vec![Segment::Index(2), field("name")]);
        assert_eq!(path.render(&by_count()), "3.name");
    }

    #[test]
    fn top_level_index_renders_alone() {
        let path = ColumnPath::new(vec![Segment::Index(0)]);
        assert_eq!(path.render(&PathStyle::default()), "[0]");
    }

    #[test]
    fn custom_separator() {
        let style = PathStyle {
            separator: "__".to_string(),
            notation: IndexNotation::Bracket,
        };
        let path = ColumnPath::new(vec![field("a"), field("b"), Segment::Index(3)]);

        assert_eq!(path.render(&style), "a__b[3]");
        assert_eq!(ColumnPath::parse("a__b[3]", &style), path);
    }

    #[test]
    fn parse_reverses_render_for_both_notations() {
        let path = ColumnPath::new(vec![
            field("matrix"),
            Segment::Index(1),
            Segment::Index(12),
            field("value"),
        ]);

        for style in [PathStyle::default(), by_count()] {
            let name = path.render(&style);
            assert_eq!(ColumnPath::parse(&name, &style), path, "{name}");
        }
    }

    #[test]
    fn parse_keeps_unusual_names_as_fields() {
        let style = PathStyle::default();

        assert_eq!(
            ColumnPath::parse("weird[x]", &style),
            ColumnPath::new(vec![field("weird[x]")])
        );
        assert_eq!(
            ColumnPath::parse("0", &by_count()),
            ColumnPath::new(vec![field("0")])
        );
        assert_eq!(ColumnPath::parse("", &style), ColumnPath::default());
    }

    #[test]
    fn index_like_field_names() {
        let brackets = PathStyle::default();
        assert!(field("k[0]").reads_as_index(&brackets));
        assert!(!field("1").reads_as_index(&brackets));
        assert!(!field("weird[x]").reads_as_index(&brackets));

        assert!(field("1").reads_as_index(&by_count()));
        assert!(!field("0").reads_as_index(&by_count()));
        assert!(!field("k[0]").reads_as_index(&by_count()));
        assert!(!Segment::Index(0).reads_as_index(&by_count()));
    }

    #[test]
    fn prefixes() {
        let parent = ColumnPath::new(vec![field("b")]);
        let child = ColumnPath::new(vec![field("b"), field("c")]);

        assert!(child.starts_with(&parent));
        assert!(child.starts_with(&child));
        assert!(!parent.starts_with(&child));
        assert_eq!(child.prefix(1), parent);
    }
}
