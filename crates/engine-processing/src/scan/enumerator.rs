use crate::error::ProcessingError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use model::{content::ContentKind, files::FileSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Temporary, log and editor backup files never make it into an archive.
const DENIED_EXTENSIONS: &[&str] = &["tmp", "temp", "log", "bak", "swp", "swo", "old"];
const DENIED_DIRS: &[&str] = &[".git", ".svn", ".hg", "node_modules", "cache", ".cache"];

/// One content directory and the category it is archived under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub kind: ContentKind,
    pub dir: PathBuf,
}

impl ScanRoot {
    pub fn new(kind: ContentKind, dir: impl Into<PathBuf>) -> Self {
        ScanRoot {
            kind,
            dir: dir.into(),
        }
    }
}

/// Walks content directories in a stable order and applies exclusion rules.
pub struct FileEnumerator {
    excludes: Option<GlobSet>,
    builtin_rules: bool,
}

impl FileEnumerator {
    pub fn new(exclude_patterns: &[String]) -> Result<Self, ProcessingError> {
        Ok(FileEnumerator {
            excludes: build_globset(exclude_patterns)?,
            builtin_rules: true,
        })
    }

    /// Takes every regular file; used when replaying an extracted archive.
    pub fn unfiltered() -> Self {
        FileEnumerator {
            excludes: None,
            builtin_rules: false,
        }
    }

    /// Scans each root once. Entries are visited sorted by file name, so the
    /// same tree always yields the same list.
    pub fn scan(&self, roots: &[ScanRoot]) -> Result<FileSet, ProcessingError> {
        let mut files = FileSet::new();
        for root in roots {
            if !root.dir.is_dir() {
                return Err(ProcessingError::MissingDirectory(root.dir.clone()));
            }
            let before = files.len();
            self.scan_root(root, &mut files)?;
            debug!(kind = %root.kind, dir = %root.dir.display(), files = files.len() - before, "Scanned");
        }
        info!(files = files.len(), bytes = files.total_bytes(), "File scan complete");
        Ok(files)
    }

    fn scan_root(&self, root: &ScanRoot, files: &mut FileSet) -> Result<(), ProcessingError> {
        let walker = WalkDir::new(&root.dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_denied_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().is_some() && e.depth() > 0 => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = archive_path(root.kind, &root.dir, entry.path());
            let name = entry.file_name().to_string_lossy();
            if self.is_excluded(entry.path(), &relative, &name) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "File vanished during scan");
                    continue;
                }
            };
            files.push(entry.path().to_path_buf(), size, relative);
        }
        Ok(())
    }

    fn is_denied_dir(&self, entry: &DirEntry) -> bool {
        self.builtin_rules
            && entry.file_type().is_dir()
            && DENIED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
    }

    fn is_excluded(&self, path: &Path, relative: &str, name: &str) -> bool {
        if self.builtin_rules {
            let denied_ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|e| DENIED_EXTENSIONS.contains(&e.as_str()));
            if denied_ext {
                return true;
            }
        }
        match &self.excludes {
            Some(set) => set.is_match(relative) || set.is_match(name),
            None => false,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, ProcessingError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

/// `<kind>/<path below root>` with forward slashes.
fn archive_path(kind: ContentKind, root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}/{}", kind.as_str(), parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::options::default_exclude_patterns;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str, len: usize) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, vec![b'x'; len]).unwrap();
    }

    #[test]
    fn applies_denylists_and_patterns() {
        let dir = tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        touch(&uploads, "2024/01/photo.jpg", 10);
        touch(&uploads, "2024/01/debug.log", 10);
        touch(&uploads, "2024/01/draft.swp", 10);
        touch(&uploads, "cache/page.html", 10);
        touch(&uploads, "plugin/node_modules/x.js", 10);
        touch(&uploads, "relocate-backups/old.zip", 10);
        touch(&uploads, "a.txt", 3);

        let enumerator = FileEnumerator::new(&default_exclude_patterns()).unwrap();
        let files = enumerator
            .scan(&[ScanRoot::new(ContentKind::Uploads, &uploads)])
            .unwrap();

        assert_eq!(files.relative, vec!["uploads/2024/01/photo.jpg", "uploads/a.txt"]);
        assert_eq!(files.sizes, vec![10, 3]);
        assert_eq!(files.paths[1], uploads.join("a.txt"));
    }

    #[test]
    fn scans_are_stable_across_runs() {
        let dir = tempdir().unwrap();
        for name in ["b/2.txt", "a/1.txt", "c.txt", "a/0.txt", "b/1.txt"] {
            touch(&dir.path().join("themes"), name, 1);
        }
        let enumerator = FileEnumerator::new(&[]).unwrap();
        let roots = [ScanRoot::new(ContentKind::Themes, dir.path().join("themes"))];
        let first = enumerator.scan(&roots).unwrap();
        let second = enumerator.scan(&roots).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn no_roots_is_an_empty_set() {
        let files = FileEnumerator::new(&[]).unwrap().scan(&[]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = FileEnumerator::new(&[])
            .unwrap()
            .scan(&[ScanRoot::new(ContentKind::Plugins, dir.path().join("nope"))])
            .unwrap_err();
        assert!(matches!(err, ProcessingError::MissingDirectory(_)));
    }

    #[test]
    fn unfiltered_keeps_everything() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("uploads"), "cache/x.log", 1);
        let files = FileEnumerator::unfiltered()
            .scan(&[ScanRoot::new(ContentKind::Uploads, dir.path().join("uploads"))])
            .unwrap();
        assert_eq!(files.relative, vec!["uploads/cache/x.log"]);
    }
}
