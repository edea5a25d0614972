use crate::archive::error::ArchiveError;
use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};
use zip::{ZipArchive, result::ZipError};

pub struct ArchiveReader {
    path: PathBuf,
    inner: ZipArchive<File>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let inner = ZipArchive::new(File::open(path)?)?;
        Ok(ArchiveReader {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Entry names, sorted.
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.file_names().any(|n| n == name)
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut entry = self.inner.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => ArchiveError::EntryNotFound(name.to_string()),
            other => ArchiveError::Zip(other),
        })?;
        let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Extracts every entry below `dir` and returns the number of files written.
    pub fn extract_to(&mut self, dir: &Path) -> Result<usize, ArchiveError> {
        std::fs::create_dir_all(dir)?;
        let mut files = 0;
        for index in 0..self.inner.len() {
            let mut entry = self.inner.by_index(index)?;
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
            let target = dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            files += 1;
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::writer::ArchiveWriter;
    use tempfile::tempdir;

    #[test]
    fn extracts_nested_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.zip");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.add_bytes("uploads/2024/img.png", b"png").unwrap();
        writer.add_bytes("database.sql", b"SELECT 1;").unwrap();
        writer.finish().unwrap();

        let out = dir.path().join("out");
        let mut reader = ArchiveReader::open(&path).unwrap();
        assert!(reader.contains("database.sql"));
        assert_eq!(reader.extract_to(&out).unwrap(), 2);
        assert_eq!(
            std::fs::read(out.join("uploads/2024/img.png")).unwrap(),
            b"png"
        );
    }

    #[test]
    fn missing_entry_is_typed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.zip");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.add_bytes("x", b"1").unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        let err = reader.read_entry("manifest.json").unwrap_err();
        assert!(matches!(err, ArchiveError::EntryNotFound(n) if n == "manifest.json"));
    }
}
