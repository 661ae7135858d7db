use std::{
    cell::RefCell,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    core::{
        config::{CsvConfig, IndexNotation, LineTerminator, NullRepresentation, RaggedCollections},
        driver::EncodeSession,
        header::HeaderRegistry,
        item::{ItemWriter, ItemWriterResult},
        schema::derive_header,
    },
    error::CsvError,
};

/// Writes serializable items as flattened CSV rows.
pub struct CsvItemWriter<W: Write> {
    session: RefCell<EncodeSession<W>>,
}

impl<W: Write, T: Serialize> ItemWriter<T> for CsvItemWriter<W> {
    /// Encodes every item in order. Items before a failing one stay written.
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let mut session = self.session.borrow_mut();
        for item in items {
            session.encode(item)?;
        }
        Ok(())
    }

    /// Flush the underlying writer.
    fn flush(&self) -> ItemWriterResult {
        self.session.borrow_mut().flush()
    }

    /// Writes the header if it is known and nothing was written yet, then flushes.
    fn close(&self) -> ItemWriterResult {
        self.session.borrow_mut().close()
    }
}

impl<W: Write> CsvItemWriter<W> {
    pub fn records_written(&self) -> usize {
        self.session.borrow().records_written()
    }

    /// Column names of the header, empty until it is known.
    pub fn header(&self) -> Vec<String> {
        self.session.borrow().header().names().to_vec()
    }

    pub fn into_inner(self) -> Result<W, CsvError> {
        self.session.into_inner().finish()
    }
}

type SchemaFn = fn(&CsvConfig) -> Result<HeaderRegistry, CsvError>;

#[derive(Default)]
pub struct CsvItemWriterBuilder {
    config: CsvConfig,
    schema: Option<SchemaFn>,
}

impl CsvItemWriterBuilder {
    pub fn new() -> CsvItemWriterBuilder {
        CsvItemWriterBuilder::default()
    }

    pub fn delimiter(mut self, delimiter: u8) -> CsvItemWriterBuilder {
        self.config.delimiter = char::from(delimiter);
        self
    }

    pub fn quote(mut self, quote: u8) -> CsvItemWriterBuilder {
        self.config.quote = char::from(quote);
        self
    }

    pub fn has_headers(mut self, yes: bool) -> CsvItemWriterBuilder {
        self.config.include_header = yes;
        self
    }

    pub fn terminator(mut self, terminator: LineTerminator) -> CsvItemWriterBuilder {
        self.config.line_terminator = terminator;
        self
    }

    pub fn path_separator(mut self, separator: &str) -> CsvItemWriterBuilder {
        self.config.path_separator = separator.to_string();
        self
    }

    pub fn index_notation(mut self, notation: IndexNotation) -> CsvItemWriterBuilder {
        self.config.index_notation = notation;
        self
    }

    pub fn quote_empty_strings(mut self, yes: bool) -> CsvItemWriterBuilder {
        self.config.quote_empty_strings = yes;
        self
    }

    pub fn null_representation(mut self, nulls: NullRepresentation) -> CsvItemWriterBuilder {
        self.config.null_representation = nulls;
        self
    }

    pub fn ragged_collections(mut self, policy: RaggedCollections) -> CsvItemWriterBuilder {
        self.config.ragged_collections = policy;
        self
    }

    /// Replaces every dialect option at once.
    pub fn config(mut self, config: CsvConfig) -> CsvItemWriterBuilder {
        self.config = config;
        self
    }

    /// Fixes the header from the declared shape of `T` instead of the first
    /// item, so that nested records that are `None` in the first item still
    /// get their columns.
    pub fn schema_of<T: DeserializeOwned>(mut self) -> CsvItemWriterBuilder {
        self.schema = Some(derive_header::<T>);
        self
    }

    /// Creates the writer over any sink.
    ///
    /// # Example
    ///
    /// ```
    /// use flatcsv::{core::item::ItemWriter, item::csv::csv_writer::CsvItemWriterBuilder};
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct Position { line: u32, column: u32 }
    ///
    /// #[derive(Serialize)]
    /// struct TestMethod<'a> { name: &'a str, position: Position }
    ///
    /// let writer = CsvItemWriterBuilder::new()
    ///     .terminator(flatcsv::core::config::LineTerminator::Lf)
    ///     .from_writer(vec![])
    ///     .unwrap();
    ///
    /// writer
    ///     .write(&[
    ///         TestMethod { name: "parsesEmptyInput", position: Position { line: 12, column: 5 } },
    ///         TestMethod { name: "rejects, politely", position: Position { line: 30, column: 5 } },
    ///     ])
    ///     .unwrap();
    ///
    /// let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    /// assert_eq!(data, "\
    /// name,position.line,position.column
    /// parsesEmptyInput,12,5
    /// \"rejects, politely\",30,5
    /// ");
    /// ```
    pub fn from_writer<W: Write>(self, wtr: W) -> Result<CsvItemWriter<W>, CsvError> {
        let header = match self.schema {
            Some(derive) => Some(derive(&self.config)?),
            None => None,
        };
        let mut session = EncodeSession::new(wtr, self.config)?;
        if let Some(header) = header {
            session = session.with_header(header);
        }
        Ok(CsvItemWriter {
            session: RefCell::new(session),
        })
    }

    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemWriter<BufWriter<File>>, CsvError> {
        let file = File::create(path)?;
        self.from_writer(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize)]
    struct Row<'a> {
        city: &'a str,
        country: &'a str,
        #[serde(rename = "popcount")]
        population: u64,
    }

    #[test]
    fn rows_follow_the_header() -> Result<(), Box<dyn Error>> {
        let wtr = CsvItemWriterBuilder::new()
            .terminator(LineTerminator::Lf)
            .from_writer(Vec::<u8>::new())?;

        wtr.write(&[
            Row {
                city: "Boston",
                country: "United States",
                population: 4628910,
            },
            Row {
                city: "Concord",
                country: "United States",
                population: 42695,
            },
        ])?;
        assert_eq!(wtr.records_written(), 2);

        let data = String::from_utf8(wtr.into_inner()?)?;
        assert_eq!(
            data,
            "city,country,popcount
Boston,United States,4628910
Concord,United States,42695
"
        );

        Ok(())
    }

    #[test]
    fn dialect_options_are_applied() -> Result<(), Box<dyn Error>> {
        let wtr = CsvItemWriterBuilder::new()
            .delimiter(b';')
            .quote(b'\'')
            .has_headers(false)
            .null_representation(NullRepresentation::Sentinel("NA".to_string()))
            .from_writer(Vec::<u8>::new())?;

        wtr.write(&[(Some("it's"), None::<u8>, "a;b")])?;

        let data = String::from_utf8(wtr.into_inner()?)?;
        assert_eq!(data, "'it''s';NA;'a;b'\r\n");
        Ok(())
    }

    #[test]
    fn schema_fixes_columns_of_absent_records() -> Result<(), Box<dyn Error>> {
        #[derive(Serialize, Deserialize)]
        struct Project {
            name: String,
        }
        #[derive(Serialize, Deserialize)]
        struct Class {
            name: String,
            project: Option<Project>,
        }

        let wtr = CsvItemWriterBuilder::new()
            .terminator(LineTerminator::Lf)
            .schema_of::<Class>()
            .from_writer(Vec::<u8>::new())?;
        assert_eq!(wtr.header(), ["name", "project.name"]);

        wtr.write(&[
            Class {
                name: "A".to_string(),
                project: None,
            },
            Class {
                name: "B".to_string(),
                project: Some(Project {
                    name: "core".to_string(),
                }),
            },
        ])?;

        let data = String::from_utf8(wtr.into_inner()?)?;
        assert_eq!(data, "name,project.name\nA,\nB,core\n");
        Ok(())
    }

    #[test]
    fn close_writes_a_known_header_without_items() -> Result<(), Box<dyn Error>> {
        #[derive(Serialize, Deserialize)]
        struct Empty {
            id: u32,
        }
        let wtr = CsvItemWriterBuilder::new().schema_of::<Empty>().from_writer(Vec::<u8>::new())?;
        ItemWriter::<Empty>::close(&wtr)?;

        assert_eq!(wtr.into_inner()?, b"id\r\n");
        Ok(())
    }

    #[test]
    fn invalid_dialect_is_a_configuration_error() {
        let result = CsvItemWriterBuilder::new()
            .delimiter(b',')
            .quote(b',')
            .from_writer(Vec::<u8>::new());
        assert!(matches!(result, Err(CsvError::Configuration(_))));
    }
}
