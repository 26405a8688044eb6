use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("all {0} frames are pinned; the workload's pinning footprint exceeds the pool size")]
    AllFramesPinned(usize),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("page buffer has wrong size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
