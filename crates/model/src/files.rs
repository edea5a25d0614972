use crate::content::ContentKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ordered result of one scan: absolute path, size and archive-relative path
/// for every file, kept as three parallel sequences of equal length.
///
/// The set is fixed once scanning completes, so an index into it stays valid
/// for the lifetime of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSet {
    pub paths: Vec<PathBuf>,
    pub sizes: Vec<u64>,
    pub relative: Vec<String>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf, size: u64, relative: String) {
        self.paths.push(path);
        self.sizes.push(size);
        self.relative.push(relative);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.sizes.iter().sum()
    }

    /// Sizes of the files at and after `from`.
    pub fn remaining_sizes(&self, from: usize) -> &[u64] {
        &self.sizes[from.min(self.sizes.len())..]
    }

    pub fn remaining_bytes(&self, from: usize) -> u64 {
        self.remaining_sizes(from).iter().sum()
    }

    pub fn count_of(&self, kind: ContentKind) -> usize {
        self.relative
            .iter()
            .filter(|r| ContentKind::from_archive_path(r) == Some(kind))
            .count()
    }
}
