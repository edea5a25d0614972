use crate::{
    error::ProcessingError,
    scan::enumerator::{FileEnumerator, ScanRoot},
};
use engine_config::settings::SiteSettings;
use engine_core::state::models::ImportCursors;
use model::{content::ContentKind, files::FileSet};
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Lists the content trees present in an extracted archive. Categories
/// the export did not carry are simply absent.
pub fn enumerate_extracted(extracted_dir: &Path) -> Result<FileSet, ProcessingError> {
    let roots: Vec<ScanRoot> = ContentKind::ALL
        .into_iter()
        .map(|kind| ScanRoot::new(kind, extracted_dir.join(kind.as_str())))
        .filter(|root| root.dir.is_dir())
        .collect();
    FileEnumerator::unfiltered().scan(&roots)
}

/// Where an archive-relative path lands in the target site.
pub fn target_path(site: &SiteSettings, relative: &str) -> Option<PathBuf> {
    let kind = ContentKind::from_archive_path(relative)?;
    let rest = relative.split_once('/')?.1;
    if rest.is_empty() || rest.split('/').any(|c| c == "..") {
        return None;
    }
    Some(site.dir_for(kind).join(rest))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileImportOutcome {
    pub copied: usize,
    pub skipped: usize,
    pub complete: bool,
}

/// Copies extracted files into the site's content directories, a bounded
/// number per call.
pub struct FileImporter<'a> {
    site: &'a SiteSettings,
    per_step: usize,
}

impl<'a> FileImporter<'a> {
    pub fn new(site: &'a SiteSettings, per_step: usize) -> Self {
        FileImporter {
            site,
            per_step: per_step.max(1),
        }
    }

    pub fn import_next_batch(
        &self,
        files: &FileSet,
        cursor: &mut ImportCursors,
    ) -> Result<FileImportOutcome, ProcessingError> {
        let end = (cursor.file_index + self.per_step).min(files.len());
        let mut outcome = FileImportOutcome::default();

        for idx in cursor.file_index..end {
            let relative = &files.relative[idx];
            let Some(target) = target_path(self.site, relative) else {
                warn!(path = %relative, "Skipping entry outside content directories");
                outcome.skipped += 1;
                continue;
            };
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match std::fs::copy(&files.paths[idx], &target) {
                Ok(_) => {
                    cursor.files_imported.push(relative.clone());
                    outcome.copied += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %files.paths[idx].display(), "Extracted file missing, skipping");
                    outcome.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        cursor.file_index = end;

        debug!(copied = outcome.copied, index = end, total = files.len(), "Imported file batch");
        outcome.complete = end >= files.len();
        if outcome.complete {
            info!(files = cursor.files_imported.len(), "File import complete");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copies_present_categories_into_site() {
        let extracted = TempDir::new().unwrap();
        let site_root = TempDir::new().unwrap();
        for (rel, body) in [
            ("uploads/2024/01/a.jpg", "a"),
            ("uploads/b.png", "bb"),
            ("themes/child/style.css", "css"),
        ] {
            let path = extracted.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }

        let files = enumerate_extracted(extracted.path()).unwrap();
        assert_eq!(files.len(), 3);

        let site = SiteSettings {
            content_dir: site_root.path().to_path_buf(),
            ..SiteSettings::default()
        };
        let importer = FileImporter::new(&site, 2);
        let mut cursor = ImportCursors::default();

        assert!(!importer.import_next_batch(&files, &mut cursor).unwrap().complete);
        assert!(importer.import_next_batch(&files, &mut cursor).unwrap().complete);
        assert_eq!(cursor.files_imported.len(), 3);
        assert_eq!(
            std::fs::read_to_string(site_root.path().join("uploads/2024/01/a.jpg")).unwrap(),
            "a"
        );
        assert!(site_root.path().join("themes/child/style.css").exists());
    }

    #[test]
    fn empty_extraction_completes_immediately() {
        let extracted = TempDir::new().unwrap();
        let files = enumerate_extracted(extracted.path()).unwrap();
        let site = SiteSettings::default();
        let mut cursor = ImportCursors::default();
        let outcome = FileImporter::new(&site, 10)
            .import_next_batch(&files, &mut cursor)
            .unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.copied, 0);
    }

    #[test]
    fn rejects_paths_outside_categories() {
        let site = SiteSettings::default();
        assert!(target_path(&site, "database.sql").is_none());
        assert!(target_path(&site, "uploads/../../etc/passwd").is_none());
        assert_eq!(
            target_path(&site, "plugins/akismet/akismet.php"),
            Some(PathBuf::from("wp-content/plugins/akismet/akismet.php"))
        );
    }
}
