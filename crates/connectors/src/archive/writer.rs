use crate::archive::error::ArchiveError;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Append-only zip writer. A finished archive can be reopened with
/// [`ArchiveWriter::open_append`] and grown further.
pub struct ArchiveWriter {
    path: PathBuf,
    inner: ZipWriter<File>,
    entries: usize,
}

impl ArchiveWriter {
    pub fn create(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        debug!(path = %path.display(), "Created archive");
        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            inner: ZipWriter::new(file),
            entries: 0,
        })
    }

    pub fn open_append(path: &Path) -> Result<Self, ArchiveError> {
        let entries = ZipArchive::new(File::open(path)?)?.len();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let inner = ZipWriter::new_append(file)?;
        debug!(path = %path.display(), entries, "Reopened archive for append");
        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            inner,
            entries,
        })
    }

    fn options(size: u64) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX))
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
        self.inner
            .start_file(name, Self::options(data.len() as u64))?;
        self.inner.write_all(data)?;
        self.entries += 1;
        Ok(())
    }

    /// Streams `source` into the archive; returns the number of bytes copied.
    pub fn add_file(&mut self, name: &str, source: &Path) -> Result<u64, ArchiveError> {
        let mut file = File::open(source)?;
        let size = file.metadata()?.len();
        self.inner.start_file(name, Self::options(size))?;
        let copied = io::copy(&mut file, &mut self.inner)?;
        self.entries += 1;
        Ok(copied)
    }

    pub fn entry_count(&self) -> usize {
        self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the central directory and syncs the file to disk.
    pub fn finish(self) -> Result<PathBuf, ArchiveError> {
        let file = self.inner.finish()?;
        file.sync_all()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::reader::ArchiveReader;
    use tempfile::tempdir;

    #[test]
    fn appends_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.zip");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.add_bytes("a.txt", b"first").unwrap();
        writer.finish().unwrap();

        let source = dir.path().join("b.bin");
        std::fs::write(&source, vec![7u8; 4096]).unwrap();

        let mut writer = ArchiveWriter::open_append(&path).unwrap();
        assert_eq!(writer.entry_count(), 1);
        assert_eq!(writer.add_file("nested/b.bin", &source).unwrap(), 4096);
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.entry_names(), vec!["a.txt", "nested/b.bin"]);
        assert_eq!(reader.read_entry("a.txt").unwrap(), b"first");
        assert_eq!(reader.read_entry("nested/b.bin").unwrap().len(), 4096);
    }

    #[test]
    fn open_append_on_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(ArchiveWriter::open_append(&dir.path().join("none.zip")).is_err());
    }
}
