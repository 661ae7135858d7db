/// CSV item reader and writer over flattened records.
///
/// Nested structs, sequences, tuples, maps and enums are laid out as one row
/// per item, with one column per scalar leaf. Column names are the paths to
/// the leaves (`address.city`, `tags[0]`), so the header alone is enough to
/// rebuild the items.
///
/// # Module Architecture
///
/// 1. **CsvItemReader**: reads the header line (or uses a given or derived
///    header) and deserializes each following row.
///
/// 2. **CsvItemWriter**: discovers the header from the first item (or from
///    the declared type with `schema_of`), writes it, then one row per item.
///
/// Both components follow the builder pattern for configuration.
///
/// # Ownership and Borrowing Considerations
///
/// The writer owns its sink. Use `into_inner` to get it back once every item
/// is written; it writes a pending header and flushes first.
///
/// # Examples
///
/// ## Round trip through a buffer
///
/// ```
/// use flatcsv::core::item::{ItemReader, ItemWriter};
/// use flatcsv::item::csv::{csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct Position {
///     line: u32,
///     column: u32,
/// }
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct TestMethod {
///     name: String,
///     tags: Vec<String>,
///     position: Position,
/// }
///
/// let methods = vec![
///     TestMethod {
///         name: "readsHeader".to_string(),
///         tags: vec!["io".to_string(), "slow".to_string()],
///         position: Position { line: 10, column: 4 },
///     },
///     TestMethod {
///         name: "writesQuotes".to_string(),
///         tags: vec!["io".to_string()],
///         position: Position { line: 22, column: 4 },
///     },
/// ];
///
/// let writer = CsvItemWriterBuilder::new().from_writer(Vec::<u8>::new()).unwrap();
/// writer.write(methods.as_slice()).unwrap();
/// let buffer = writer.into_inner().unwrap();
///
/// let reader = CsvItemReaderBuilder::new().from_reader(buffer.as_slice()).unwrap();
/// let mut read_back: Vec<TestMethod> = Vec::new();
/// while let Some(method) = reader.read().unwrap() {
///     read_back.push(method);
/// }
///
/// assert_eq!(read_back, methods);
/// assert_eq!(
///     reader.header(),
///     ["name", "tags[0]", "tags[1]", "position.line", "position.column"]
/// );
/// ```

/// A module providing facilities for reading CSV data records.
pub mod csv_reader;

/// A module providing facilities for writing CSV data records.
pub mod csv_writer;
