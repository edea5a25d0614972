use crate::content::ContentKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SPLIT_SIZE_MB: u64 = 100;
pub const DEFAULT_FILES_PER_STEP: usize = 100;
pub const DEFAULT_DB_ROWS_PER_STEP: usize = 10_000;

const FILES_PER_STEP_RANGE: (usize, usize) = (1, 200);
const DB_ROWS_PER_STEP_RANGE: (usize, usize) = (100, 50_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbExportMode {
    /// Fixed rows per step, one INSERT per row.
    #[default]
    Standard,
    /// Fixed rows per step, one validated multi-row INSERT per chunk.
    Optimized,
    /// Rows per step derived from table shape, small tables grouped.
    Adaptive,
}

/// Options recognized by an export run. Unknown keys are ignored and missing
/// keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_uploads: bool,
    pub include_plugins: bool,
    pub include_themes: bool,
    pub include_database: bool,
    /// Part size in MB; 0 never splits.
    pub split_size: u64,
    pub files_per_step: usize,
    pub db_rows_per_step: usize,
    pub db_export_mode: DbExportMode,
    pub exclude_patterns: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            include_uploads: true,
            include_plugins: true,
            include_themes: true,
            include_database: true,
            split_size: DEFAULT_SPLIT_SIZE_MB,
            files_per_step: DEFAULT_FILES_PER_STEP,
            db_rows_per_step: DEFAULT_DB_ROWS_PER_STEP,
            db_export_mode: DbExportMode::Standard,
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

pub fn default_exclude_patterns() -> Vec<String> {
    [
        "*.log",
        "*/cache/*",
        "*/node_modules/*",
        "*/.git/*",
        "*/relocate-backups/*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ExportOptions {
    /// Clamps the numeric knobs into their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.files_per_step = self
            .files_per_step
            .clamp(FILES_PER_STEP_RANGE.0, FILES_PER_STEP_RANGE.1);
        self.db_rows_per_step = self
            .db_rows_per_step
            .clamp(DB_ROWS_PER_STEP_RANGE.0, DB_ROWS_PER_STEP_RANGE.1);
        self
    }

    pub fn categories(&self) -> Vec<ContentKind> {
        let mut kinds = Vec::new();
        if self.include_uploads {
            kinds.push(ContentKind::Uploads);
        }
        if self.include_plugins {
            kinds.push(ContentKind::Plugins);
        }
        if self.include_themes {
            kinds.push(ContentKind::Themes);
        }
        kinds
    }

    pub fn split_size_bytes(&self) -> Option<u64> {
        (self.split_size > 0).then(|| self.split_size.saturating_mul(1024 * 1024))
    }
}

/// Options for an import run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Either one archive or the ordered parts of a split archive.
    pub archive: Vec<PathBuf>,
    pub skip_backup: bool,
    /// Overrides the configured target site URL for URL rewriting.
    pub site_url: Option<String>,
}
