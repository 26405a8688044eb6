use thiserror::Error;

use crate::file::FileError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("record of {size} bytes cannot fit on an empty page of {page_size} bytes")]
    RecordTooLarge { size: usize, page_size: usize },

    #[error("malformed text row: {0}")]
    MalformedRow(String),
}

pub type TableResult<T> = Result<T, TableError>;
