use crate::progress::RuntimeWindow;
use model::{
    files::FileSet,
    manifest::Manifest,
    options::{ExportOptions, ImportOptions},
    strategy::DumpStrategy,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Export,
    Import,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Export => "export",
            SessionKind::Import => "import",
        }
    }

    pub fn session_key(&self) -> String {
        format!("session:{}", self.as_str())
    }

    pub fn lock_key(&self) -> String {
        format!("lock:{}", self.as_str())
    }
}

/// Advisory tick lock held by one caller until `expires_at_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
    pub holder: String,
    pub expires_at_ms: i64,
}

/// Shape of one table captured at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub rows: u64,
    pub avg_row_bytes: u64,
}

/// One unit of the dump plan: a single table, or a group of small tables
/// dumped whole in one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBatch {
    pub tables: Vec<String>,
    pub rows_per_chunk: u64,
    pub grouped: bool,
}

/// Resumption point of the chunked database dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpCursor {
    /// `None` until tables are discovered on the first tick.
    pub tables: Option<Vec<TableInfo>>,
    pub batches: Vec<TableBatch>,
    pub current_batch_index: usize,
    pub current_table: Option<String>,
    pub table_row_offset: u64,
    pub completed_tables: BTreeSet<String>,
    /// Length of the dump file covered by this cursor.
    pub committed_len: u64,
    pub rows_written: u64,
    pub chunks_written: u64,
    pub bulk_fallbacks: u64,
    pub header_written: bool,
    pub footer_written: bool,
}

impl DumpCursor {
    pub fn is_started(&self) -> bool {
        self.tables.is_some()
    }

    pub fn total_tables(&self) -> usize {
        self.tables.as_ref().map_or(0, Vec::len)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables
            .as_ref()
            .map_or(0, |t| t.iter().map(|t| t.rows).sum())
    }

    pub fn is_complete(&self) -> bool {
        match &self.tables {
            Some(tables) => {
                self.footer_written
                    && tables.iter().all(|t| self.completed_tables.contains(&t.name))
            }
            None => false,
        }
    }
}

/// Resumption point of the batch archiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveCursor {
    pub current_index: usize,
    pub files_added: usize,
    pub files_skipped: usize,
    pub bytes_added: u64,
    pub batches: u64,
    pub last_batch_size: usize,
    /// Archive file exists on disk.
    pub created: bool,
    /// A writer was left open by a previous tick.
    pub handle_open: bool,
    pub rebuilds: u32,
    pub runtime: RuntimeWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCursors {
    pub options: ExportOptions,
    pub strategy: DumpStrategy,
    pub work_dir: PathBuf,
    pub archive_path: PathBuf,
    pub dump_path: PathBuf,
    pub files: Option<FileSet>,
    pub archive: ArchiveCursor,
    pub dump: DumpCursor,
    pub manifest: Option<Manifest>,
    pub database_folded: bool,
    pub artifacts: Vec<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportCursors {
    pub options: ImportOptions,
    pub work_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub extracted_dir: Option<PathBuf>,
    pub manifest: Option<Manifest>,
    pub backup_path: Option<PathBuf>,
    pub backup_dump_path: Option<PathBuf>,
    pub backup: DumpCursor,
    pub backup_skipped: bool,
    pub sql_offset: u64,
    pub statements_executed: u64,
    pub sql_done: bool,
    pub files: Option<FileSet>,
    pub file_index: usize,
    pub files_imported: Vec<String>,
    pub rows_rewritten: u64,
    pub current_operation: String,
}
