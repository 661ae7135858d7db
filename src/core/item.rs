use crate::error::CsvError;

/// Result of reading one item: `Ok(None)` once the source is exhausted.
pub type ItemReaderResult<T> = Result<Option<T>, CsvError>;

pub type ItemWriterResult = Result<(), CsvError>;

pub trait ItemReader<T> {
    fn read(&self) -> ItemReaderResult<T>;
}

pub trait ItemWriter<T> {
    fn write(&self, items: &[T]) -> ItemWriterResult;
    fn flush(&self) -> ItemWriterResult;
    fn open(&self) -> ItemWriterResult {
        Ok(())
    }
    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}
