use crate::error::ProcessingError;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Append-only handle on the dump file that only ever grows from a
/// committed length.
///
/// Bytes past `committed_len` belong to a chunk whose cursor update never
/// persisted; they are cut on open so the chunk is written exactly once.
pub struct DumpFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl DumpFile {
    pub fn open(path: &Path, committed_len: u64) -> Result<Self, ProcessingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let found = file.metadata()?.len();

        if found < committed_len {
            return Err(ProcessingError::DumpTruncated {
                path: path.to_path_buf(),
                expected: committed_len,
                found,
            });
        }
        if found > committed_len {
            tracing::warn!(
                path = %path.display(),
                extra = found - committed_len,
                "Discarding uncommitted dump bytes"
            );
            file.set_len(committed_len)?;
        }

        Ok(DumpFile {
            path: path.to_path_buf(),
            file,
            len: committed_len,
        })
    }

    /// Appends `chunk` durably and returns the new file length.
    pub fn append(&mut self, chunk: &str) -> Result<u64, ProcessingError> {
        self.file.write_all(chunk.as_bytes())?;
        self.file.sync_data()?;
        self.len += chunk.len() as u64;
        Ok(self.len)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
