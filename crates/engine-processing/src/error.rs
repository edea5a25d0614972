use connectors::{archive::error::ArchiveError, sql::base::error::DbError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Directory not found: {0}")]
    MissingDirectory(PathBuf),

    /// The dump file lost bytes the cursor had already committed.
    #[error("Dump file {path} is {found} bytes, expected at least {expected}")]
    DumpTruncated {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
