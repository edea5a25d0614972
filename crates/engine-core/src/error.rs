use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("State store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode or decode session: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Part size must be greater than zero")]
    ZeroPartSize,

    #[error("Not a part file: {0}")]
    NotAPart(String),

    #[error("No parts given")]
    NoParts,

    #[error("Combined size mismatch: expected {expected} bytes, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Parts manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}
