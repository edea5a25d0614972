use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// A fixed, ordered sequence of steps driven one tick at a time.
pub trait StepSequence:
    Copy + Eq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const SEQUENCE: &'static [Self];

    fn as_str(&self) -> &'static str;

    /// Human-readable description shown while the step is pending.
    fn description(&self) -> &'static str;

    fn first() -> Self {
        Self::SEQUENCE[0]
    }

    fn total() -> usize {
        Self::SEQUENCE.len()
    }

    fn index(&self) -> usize {
        Self::SEQUENCE
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    fn next(&self) -> Option<Self> {
        Self::SEQUENCE.get(self.index() + 1).copied()
    }

    fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStep {
    PrepareExport,
    ScanFiles,
    ExportDatabase,
    ArchiveFiles,
    CreateManifest,
    SplitArchive,
    FinalizeExport,
}

impl StepSequence for ExportStep {
    const SEQUENCE: &'static [Self] = &[
        ExportStep::PrepareExport,
        ExportStep::ScanFiles,
        ExportStep::ExportDatabase,
        ExportStep::ArchiveFiles,
        ExportStep::CreateManifest,
        ExportStep::SplitArchive,
        ExportStep::FinalizeExport,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ExportStep::PrepareExport => "prepare_export",
            ExportStep::ScanFiles => "scan_files",
            ExportStep::ExportDatabase => "export_database",
            ExportStep::ArchiveFiles => "archive_files",
            ExportStep::CreateManifest => "create_manifest",
            ExportStep::SplitArchive => "split_archive",
            ExportStep::FinalizeExport => "finalize_export",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ExportStep::PrepareExport => "Preparing export",
            ExportStep::ScanFiles => "Scanning content files",
            ExportStep::ExportDatabase => "Exporting database",
            ExportStep::ArchiveFiles => "Archiving files",
            ExportStep::CreateManifest => "Writing manifest",
            ExportStep::SplitArchive => "Splitting archive",
            ExportStep::FinalizeExport => "Finalizing export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    UploadFile,
    ExtractArchive,
    ValidateManifest,
    BackupCurrentSite,
    ImportDatabase,
    ImportFiles,
    UpdateUrls,
    Cleanup,
}

impl StepSequence for ImportStep {
    const SEQUENCE: &'static [Self] = &[
        ImportStep::UploadFile,
        ImportStep::ExtractArchive,
        ImportStep::ValidateManifest,
        ImportStep::BackupCurrentSite,
        ImportStep::ImportDatabase,
        ImportStep::ImportFiles,
        ImportStep::UpdateUrls,
        ImportStep::Cleanup,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ImportStep::UploadFile => "upload_file",
            ImportStep::ExtractArchive => "extract_archive",
            ImportStep::ValidateManifest => "validate_manifest",
            ImportStep::BackupCurrentSite => "backup_current_site",
            ImportStep::ImportDatabase => "import_database",
            ImportStep::ImportFiles => "import_files",
            ImportStep::UpdateUrls => "update_urls",
            ImportStep::Cleanup => "cleanup",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ImportStep::UploadFile => "Receiving archive",
            ImportStep::ExtractArchive => "Extracting archive",
            ImportStep::ValidateManifest => "Validating manifest",
            ImportStep::BackupCurrentSite => "Backing up current site",
            ImportStep::ImportDatabase => "Importing database",
            ImportStep::ImportFiles => "Importing files",
            ImportStep::UpdateUrls => "Updating site URLs",
            ImportStep::Cleanup => "Cleaning up",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_sequence_walks_in_order() {
        let mut step = ExportStep::first();
        let mut visited = vec![step];
        while let Some(next) = step.next() {
            visited.push(next);
            step = next;
        }
        assert_eq!(visited, ExportStep::SEQUENCE);
        assert!(ExportStep::FinalizeExport.is_terminal());
        assert_eq!(ExportStep::total(), 7);
    }

    #[test]
    fn import_indices_match_sequence() {
        for (i, step) in ImportStep::SEQUENCE.iter().enumerate() {
            assert_eq!(step.index(), i);
        }
        assert_eq!(ImportStep::Cleanup.next(), None);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ImportStep::BackupCurrentSite).unwrap();
        assert_eq!(json, "\"backup_current_site\"");
    }
}
