use std::io;

use thiserror::Error;

use crate::{FileId, Rid};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("buffer pool exhausted: all frames pinned")]
    PoolExhausted,

    #[error("file {0} is not open")]
    FileNotOpen(FileId),

    #[error("index entry not found")]
    IndexEntryNotFound,

    #[error("index integrity violation: {0}")]
    IndexCorrupted(String),

    #[error("record not found at {0:?}")]
    RecordNotFound(Rid),

    #[error("record length {got} does not match file record size {expected}")]
    RecordSizeMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, StorageError>;
