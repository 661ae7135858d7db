use std::{
    io::{BufRead, Write},
    marker::PhantomData,
};

use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    core::{
        config::CsvConfig,
        decoder::decode_record,
        encoder::encode_record,
        header::{HeaderRegistry, Shape},
        quoting::{RawRecord, RecordReader, encode_field, join_record},
        schema::derive_header,
    },
    error::{CsvError, Result},
};

/// Writes records of one shape to a sink, header line first.
///
/// The header is discovered from the first record unless one is supplied with
/// [`EncodeSession::with_header`]. It is written just before the first row, so
/// a first record that fails leaves the sink untouched.
pub struct EncodeSession<W: Write> {
    writer: W,
    config: CsvConfig,
    registry: HeaderRegistry,
    header_written: bool,
    records_written: usize,
}

impl<W: Write> EncodeSession<W> {
    pub fn new(writer: W, config: CsvConfig) -> Result<Self> {
        config.validate()?;
        let registry = HeaderRegistry::new(&config);
        Ok(Self {
            writer,
            config,
            registry,
            header_written: false,
            records_written: 0,
        })
    }

    /// Uses a known header, e.g. one derived with [`derive_header`], instead
    /// of discovering it from the first record.
    pub fn with_header(mut self, mut registry: HeaderRegistry) -> Self {
        registry.freeze();
        self.registry = registry;
        self
    }

    pub fn encode<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<()> {
        let line = encode_record(record, &mut self.registry, &self.config)?;
        self.write_header()?;
        self.writer.write_all(line.as_bytes())?;
        self.records_written += 1;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written || !self.config.include_header || self.registry.is_empty() {
            return Ok(());
        }
        let line = join_record(
            self.registry
                .names()
                .iter()
                .map(|name| encode_field(name, &self.config)),
            &self.config,
        );
        self.writer.write_all(line.as_bytes())?;
        self.header_written = true;
        debug!("Wrote header line with {} column(s)", self.registry.len());
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn header(&self) -> &HeaderRegistry {
        &self.registry
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the header if it is known but no row was written, then flushes.
    pub fn close(&mut self) -> Result<()> {
        if self.registry.is_frozen() {
            self.write_header()?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Closes the session and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        debug!("Encode session finished after {} record(s)", self.records_written);
        Ok(self.writer)
    }
}

/// A malformed line that was skipped under the configured `skip_limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

/// Reads records of one shape from a buffered source.
pub struct DecodeSession<R: BufRead> {
    records: RecordReader<R>,
    config: CsvConfig,
    header: Option<(HeaderRegistry, Shape)>,
    header_read: bool,
    skipped: Vec<SkippedRow>,
}

impl<R: BufRead> DecodeSession<R> {
    pub fn new(reader: R, config: CsvConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            records: RecordReader::new(reader, &config),
            config,
            header: None,
            header_read: false,
            skipped: Vec::new(),
        })
    }

    /// Uses a known header. When the input also starts with a header line,
    /// that line is still consumed on the first read.
    pub fn with_header(mut self, registry: HeaderRegistry) -> Result<Self> {
        let shape = registry.shape()?;
        self.header = Some((registry, shape));
        Ok(self)
    }

    pub fn header(&self) -> Option<&HeaderRegistry> {
        self.header.as_ref().map(|(registry, _)| registry)
    }

    pub fn skipped_rows(&self) -> &[SkippedRow] {
        &self.skipped
    }

    /// Number of physical lines consumed so far.
    pub fn line(&self) -> usize {
        self.records.line()
    }

    /// Returns the next record, or `Ok(None)` at end of input.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if !self.ensure_header::<T>()? {
            return Ok(None);
        }

        loop {
            let Some(record) = self.read_record()? else {
                return Ok(None);
            };
            let Some((registry, shape)) = &self.header else {
                return Err(CsvError::Message("header is not available".to_string()));
            };
            if is_blank(&record) && registry.len() != 1 {
                continue;
            }
            return decode_record(shape, &record.fields, registry, &self.config)
                .map(Some)
                .map_err(|error| error.at_line(record.line));
        }
    }

    /// Iterates over the remaining records.
    pub fn records<T: DeserializeOwned>(&mut self) -> DecodedRecords<'_, R, T> {
        DecodedRecords {
            session: self,
            _marker: PhantomData,
        }
    }

    /// Reads or derives the header; false when the input holds nothing at all.
    ///
    /// The header line is never skipped: a malformed one fails the session.
    fn ensure_header<T: DeserializeOwned>(&mut self) -> Result<bool> {
        if self.config.include_header && !self.header_read {
            let names = loop {
                match self.records.read_record() {
                    Ok(Some(record)) if is_blank(&record) => continue,
                    Ok(Some(record)) => break record,
                    Ok(None) => return Ok(self.header.is_some()),
                    Err(error) => {
                        self.header_read = true;
                        return Err(error);
                    }
                }
            };
            self.header_read = true;
            if self.header.is_none() {
                let registry = HeaderRegistry::from_names(
                    names.fields.iter().map(|field| field.text.as_str()),
                    &self.config,
                )
                .map_err(|error| error.at_line(names.line))?;
                let shape = registry.shape().map_err(|error| error.at_line(names.line))?;
                debug!(
                    "Read header with {} column(s): {:?}",
                    registry.len(),
                    registry.names()
                );
                self.header = Some((registry, shape));
            }
        }

        if self.header.is_none() {
            if self.config.include_header {
                return Err(CsvError::SchemaMismatch(
                    "the header line could not be read".to_string(),
                ));
            }
            let registry = derive_header::<T>(&self.config)?;
            let shape = registry.shape()?;
            self.header = Some((registry, shape));
        }
        Ok(true)
    }

    /// Reads the next raw record, skipping malformed lines while the skip
    /// limit allows it.
    fn read_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            match self.records.read_record() {
                Err(CsvError::MalformedRow { line, reason })
                    if self.skipped.len() < self.config.skip_limit =>
                {
                    warn!("Skipping malformed row at line {line}: {reason}");
                    self.skipped.push(SkippedRow { line, reason });
                }
                other => return other,
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.records.into_inner()
    }
}

fn is_blank(record: &RawRecord) -> bool {
    matches!(record.fields.as_slice(), [field] if field.text.is_empty() && !field.quoted)
}

/// Iterator returned by [`DecodeSession::records`].
pub struct DecodedRecords<'s, R: BufRead, T> {
    session: &'s mut DecodeSession<R>,
    _marker: PhantomData<T>,
}

impl<R: BufRead, T: DeserializeOwned> Iterator for DecodedRecords<'_, R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.next().transpose()
    }
}
