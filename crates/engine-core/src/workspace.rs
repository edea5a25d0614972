use chrono::{DateTime, Utc};
use std::{
    io,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// `yyyymmdd-HHMMSS-<8 hex>`; sortable by start time and unique per run.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &random[..8])
}

/// On-disk locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub run_id: String,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunLayout {
    pub fn new(run_id: &str, work_root: &Path, output_dir: &Path) -> Self {
        RunLayout {
            run_id: run_id.to_string(),
            work_dir: work_root.join(run_id),
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn dump_path(&self) -> PathBuf {
        self.work_dir.join(model::manifest::DATABASE_FILE)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.work_dir.join("extracted")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.zip", self.run_id))
    }

    pub fn manifest_copy_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.manifest.json", self.run_id))
    }

    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.output_dir)
    }
}

/// Removes a directory tree; a directory that is already gone is not an error.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
