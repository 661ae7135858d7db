use std::{
    cell::RefCell,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use serde::de::DeserializeOwned;

use crate::{
    core::{
        config::{CsvConfig, IndexNotation, LineTerminator, NullRepresentation},
        driver::{DecodeSession, SkippedRow},
        header::HeaderRegistry,
        item::{ItemReader, ItemReaderResult},
    },
    error::CsvError,
};

/// Reads flattened CSV rows back into items.
///
/// The header line names the columns; without one, the columns are derived
/// from the item type on the first read.
pub struct CsvItemReader<R: BufRead> {
    session: RefCell<DecodeSession<R>>,
}

impl<R: BufRead, T: DeserializeOwned> ItemReader<T> for CsvItemReader<R> {
    fn read(&self) -> ItemReaderResult<T> {
        self.session.borrow_mut().next()
    }
}

impl<R: BufRead> CsvItemReader<R> {
    /// Malformed lines skipped so far under the skip limit.
    pub fn skipped_rows(&self) -> Vec<SkippedRow> {
        self.session.borrow().skipped_rows().to_vec()
    }

    /// Column names of the header, empty until the first read.
    pub fn header(&self) -> Vec<String> {
        self.session
            .borrow()
            .header()
            .map(|header| header.names().to_vec())
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct CsvItemReaderBuilder {
    config: CsvConfig,
    header: Option<Vec<String>>,
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = char::from(delimiter);
        self
    }

    pub fn quote(mut self, quote: u8) -> Self {
        self.config.quote = char::from(quote);
        self
    }

    /// Reading accepts CRLF and LF whatever the configured terminator.
    pub fn terminator(mut self, terminator: LineTerminator) -> Self {
        self.config.line_terminator = terminator;
        self
    }

    /// Whether the first line of the input is a header line.
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.config.include_header = yes;
        self
    }

    pub fn path_separator(mut self, separator: &str) -> Self {
        self.config.path_separator = separator.to_string();
        self
    }

    pub fn index_notation(mut self, notation: IndexNotation) -> Self {
        self.config.index_notation = notation;
        self
    }

    pub fn null_representation(mut self, nulls: NullRepresentation) -> Self {
        self.config.null_representation = nulls;
        self
    }

    /// Number of malformed lines tolerated before reading fails.
    pub fn skip_limit(mut self, limit: usize) -> Self {
        self.config.skip_limit = limit;
        self
    }

    pub fn config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses these column names instead of the header line.
    pub fn header<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Creates the reader over any byte source.
    ///
    /// # Example
    ///
    /// ```
    /// use flatcsv::{core::item::ItemReader, item::csv::csv_reader::CsvItemReaderBuilder};
    /// use serde::Deserialize;
    ///
    /// #[derive(Debug, Deserialize, PartialEq)]
    /// struct Project { name: String }
    ///
    /// #[derive(Debug, Deserialize, PartialEq)]
    /// struct Class { name: String, project: Option<Project> }
    ///
    /// let csv_data = "\
    /// name,project.name
    /// ParserTest,core
    /// OrphanTest,
    /// ";
    ///
    /// let reader = CsvItemReaderBuilder::new().from_reader(csv_data.as_bytes()).unwrap();
    ///
    /// let first: Class = reader.read().unwrap().unwrap();
    /// assert_eq!(first.project, Some(Project { name: "core".to_string() }));
    ///
    /// let second: Class = reader.read().unwrap().unwrap();
    /// assert_eq!(second.project, None);
    ///
    /// assert!(ItemReader::<Class>::read(&reader).unwrap().is_none());
    /// ```
    pub fn from_reader<R: Read>(self, rdr: R) -> Result<CsvItemReader<BufReader<R>>, CsvError> {
        self.build(BufReader::new(rdr))
    }

    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemReader<BufReader<File>>, CsvError> {
        let file = File::open(path)?;
        self.build(BufReader::new(file))
    }

    fn build<R: BufRead>(self, rdr: R) -> Result<CsvItemReader<R>, CsvError> {
        let header = match &self.header {
            Some(names) => Some(HeaderRegistry::from_names(names, &self.config)?),
            None => None,
        };
        let mut session = DecodeSession::new(rdr, self.config)?;
        if let Some(header) = header {
            session = session.with_header(header)?;
        }
        Ok(CsvItemReader {
            session: RefCell::new(session),
        })
    }
}
