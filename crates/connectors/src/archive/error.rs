use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    /// Entry name would resolve outside the extraction directory.
    #[error("Unsafe entry path: {0}")]
    UnsafePath(String),
}
