use thiserror::Error;

use crate::record::RecordError;
use crate::table::TableError;

#[derive(Debug, Error)]
pub enum BTreeError {
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("no attribute named {0} to order the index by")]
    NoSuchAttribute(String),
}

pub type BTreeResult<T> = Result<T, BTreeError>;
