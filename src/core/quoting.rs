//! RFC 4180 field quoting and record tokenizing.
//!
//! Encoding wraps a value in quotes when it contains the delimiter, the quote
//! character or a line break (or when it is empty and empty strings must be
//! quoted), doubling every embedded quote. Decoding is the inverse and is fed
//! physical lines, so a quoted field may span several of them.

use std::{borrow::Cow, io::BufRead};

use log::trace;

use crate::{
    core::{config::CsvConfig, row::Scalar},
    error::{CsvError, Result},
};

/// Escapes one text value for embedding in a record.
pub fn encode_field<'a>(value: &'a str, config: &CsvConfig) -> Cow<'a, str> {
    let quote = config.quote;
    let needs_quotes = if value.is_empty() {
        config.quote_empty_strings
    } else {
        value.contains([config.delimiter, quote, '\r', '\n'])
            || config.null_sentinel() == Some(value)
    };

    if !needs_quotes {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push(quote);
    for c in value.chars() {
        if c == quote {
            escaped.push(quote);
        }
        escaped.push(c);
    }
    escaped.push(quote);
    Cow::Owned(escaped)
}

/// Renders a cell, writing null with the configured representation.
pub fn encode_scalar<'a>(value: &'a Scalar, config: &'a CsvConfig) -> Cow<'a, str> {
    match value {
        Scalar::Text(text) => encode_field(text, config),
        Scalar::Null => Cow::Borrowed(config.null_sentinel().unwrap_or("")),
    }
}

/// Joins already rendered cells into one terminated line.
pub fn join_record<'a, I>(cells: I, config: &CsvConfig) -> String
where
    I: IntoIterator<Item = Cow<'a, str>>,
{
    let mut line = String::new();
    for (i, cell) in cells.into_iter().enumerate() {
        if i > 0 {
            line.push(config.delimiter);
        }
        line.push_str(&cell);
    }
    line.push_str(config.line_terminator.as_str());
    line
}

/// A raw field as it appeared in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub text: String,
    /// Whether the field was enclosed in quotes; `""` is an empty string, not null.
    pub quoted: bool,
}

impl Field {
    pub fn unquoted(text: &str) -> Self {
        Self {
            text: text.to_string(),
            quoted: false,
        }
    }

    /// True when this field holds the configured null marker.
    pub fn is_null(&self, config: &CsvConfig) -> bool {
        if self.quoted {
            return false;
        }
        match config.null_sentinel() {
            Some(sentinel) => self.text == sentinel,
            None => self.text.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote was read inside a quoted field: either an escape or the end.
    QuoteInQuoted,
}

/// Outcome of feeding one physical line to the [`Tokenizer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Feed {
    Complete(Vec<Field>),
    /// The line ended inside a quoted field; feed the next one.
    Incomplete,
}

/// Incremental record tokenizer; keeps its state across physical lines.
#[derive(Debug)]
pub struct Tokenizer {
    delimiter: char,
    quote: char,
    state: State,
    fields: Vec<Field>,
    current: String,
    quoted: bool,
    started: bool,
}

impl Tokenizer {
    pub fn new(config: &CsvConfig) -> Self {
        Self {
            delimiter: config.delimiter,
            quote: config.quote,
            state: State::FieldStart,
            fields: Vec::new(),
            current: String::new(),
            quoted: false,
            started: false,
        }
    }

    /// True when a record has been started and not yet completed.
    pub fn in_record(&self) -> bool {
        self.started
    }

    pub fn reset(&mut self) {
        self.state = State::FieldStart;
        self.fields.clear();
        self.current.clear();
        self.quoted = false;
        self.started = false;
    }

    fn end_field(&mut self) {
        self.fields.push(Field {
            text: std::mem::take(&mut self.current),
            quoted: self.quoted,
        });
        self.quoted = false;
        self.state = State::FieldStart;
    }

    fn complete(&mut self) -> Feed {
        self.end_field();
        self.started = false;
        Feed::Complete(std::mem::take(&mut self.fields))
    }

    /// Consumes one physical line, terminator included when present.
    ///
    /// On error the tokenizer is reset so the next line starts a new record.
    pub fn feed(&mut self, line: &str) -> std::result::Result<Feed, String> {
        let result = self.feed_inner(line);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn feed_inner(&mut self, line: &str) -> std::result::Result<Feed, String> {
        if !line.is_empty() {
            self.started = true;
        }
        let mut chars = line.chars().peekable();
        let mut column = 0;

        while let Some(c) = chars.next() {
            column += 1;
            let line_break = c == '\n' || (c == '\r' && chars.peek() == Some(&'\n'));

            match self.state {
                State::Quoted => {
                    if c == self.quote {
                        self.state = State::QuoteInQuoted;
                    } else {
                        self.current.push(c);
                    }
                }
                State::QuoteInQuoted => {
                    if c == self.quote {
                        self.current.push(c);
                        self.state = State::Quoted;
                    } else if c == self.delimiter {
                        self.end_field();
                    } else if line_break {
                        return Ok(self.complete());
                    } else {
                        return Err(format!(
                            "unexpected character {c:?} after closing quote at column {column}"
                        ));
                    }
                }
                State::FieldStart | State::Unquoted => {
                    if c == self.delimiter {
                        self.end_field();
                    } else if line_break {
                        return Ok(self.complete());
                    } else if c == self.quote {
                        if self.state == State::Unquoted {
                            return Err(format!(
                                "unescaped quote inside an unquoted field at column {column}"
                            ));
                        }
                        self.quoted = true;
                        self.state = State::Quoted;
                    } else {
                        self.current.push(c);
                        self.state = State::Unquoted;
                    }
                }
            }
        }

        Ok(Feed::Incomplete)
    }

    /// Signals the end of input and returns the last, unterminated record if any.
    pub fn finish(&mut self) -> std::result::Result<Option<Vec<Field>>, String> {
        if !self.started {
            return Ok(None);
        }
        if self.state == State::Quoted {
            self.reset();
            return Err("quoted field is not closed before the end of input".to_string());
        }
        match self.complete() {
            Feed::Complete(fields) => Ok(Some(fields)),
            Feed::Incomplete => Ok(None),
        }
    }
}

/// Tokenizes one complete logical record.
pub fn split_record(text: &str, config: &CsvConfig) -> Result<Vec<Field>> {
    let mut tokenizer = Tokenizer::new(config);
    let malformed = |reason| CsvError::MalformedRow { line: 1, reason };

    match tokenizer.feed(text).map_err(malformed)? {
        Feed::Complete(fields) => Ok(fields),
        Feed::Incomplete => Ok(tokenizer
            .finish()
            .map_err(malformed)?
            .unwrap_or_else(|| vec![Field::unquoted("")])),
    }
}

/// Decodes a single field produced by [`encode_field`].
pub fn decode_field(text: &str, config: &CsvConfig) -> Result<String> {
    let mut fields = split_record(text, config)?;
    if fields.len() != 1 {
        return Err(CsvError::MalformedRow {
            line: 1,
            reason: format!("expected a single field, found {}", fields.len()),
        });
    }
    Ok(fields.remove(0).text)
}

/// A tokenized record and the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: usize,
    pub fields: Vec<Field>,
}

/// Reads logical records from a buffered character stream.
pub struct RecordReader<R> {
    reader: R,
    tokenizer: Tokenizer,
    buffer: String,
    line: usize,
    exhausted: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R, config: &CsvConfig) -> Self {
        Self {
            reader,
            tokenizer: Tokenizer::new(config),
            buffer: String::new(),
            line: 0,
            exhausted: false,
        }
    }

    /// Number of physical lines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the next record, `Ok(None)` at end of input.
    ///
    /// A malformed record consumes the physical lines it spans; the following
    /// call resumes with the next line.
    pub fn read_record(&mut self) -> Result<Option<RawRecord>> {
        if self.exhausted {
            return Ok(None);
        }
        let start = self.line + 1;

        loop {
            self.buffer.clear();
            let read = self.reader.read_line(&mut self.buffer)?;
            if read == 0 {
                self.exhausted = true;
                let fields = self
                    .tokenizer
                    .finish()
                    .map_err(|reason| CsvError::MalformedRow { line: start, reason })?;
                return Ok(fields.map(|fields| RawRecord {
                    line: start,
                    fields,
                }));
            }

            self.line += 1;
            match self.tokenizer.feed(&self.buffer) {
                Ok(Feed::Complete(fields)) => {
                    trace!(
                        "Record at line {} spans {} line(s)",
                        start,
                        self.line + 1 - start
                    );
                    return Ok(Some(RawRecord {
                        line: start,
                        fields,
                    }));
                }
                Ok(Feed::Incomplete) => continue,
                Err(reason) => return Err(CsvError::MalformedRow { line: start, reason }),
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
