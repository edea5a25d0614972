use crate::{context::RuntimeContext, error::MigrationError, manifest::database_manifest};
use connectors::archive::writer::ArchiveWriter;
use engine_core::state::models::ImportCursors;
use engine_processing::dump::dumper::DatabaseDumper;
use model::{
    manifest::{DATABASE_FILE, MANIFEST_FILE},
    options::DEFAULT_DB_ROWS_PER_STEP,
    strategy::DumpStrategy,
};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupProgress {
    Pending { tables_done: usize, tables_total: usize },
    Done(PathBuf),
}

pub fn backup_archive_path(ctx: &RuntimeContext, run_id: &str) -> PathBuf {
    ctx.settings
        .paths
        .backup_dir
        .join(format!("pre-import-{run_id}.zip"))
}

/// Dumps the current database one chunk per call. Once the dump is complete
/// it is packaged with a manifest into the backup directory.
pub async fn backup_next_chunk(
    ctx: &RuntimeContext,
    run_id: &str,
    cursors: &mut ImportCursors,
) -> Result<BackupProgress, MigrationError> {
    let dump_path = cursors
        .backup_dump_path
        .get_or_insert_with(|| cursors.work_dir.join("backup").join(DATABASE_FILE))
        .clone();

    let dumper = DatabaseDumper::new(
        ctx.adapter.clone(),
        DumpStrategy::uniform(DEFAULT_DB_ROWS_PER_STEP as u64),
        &dump_path,
    );
    let outcome = dumper.dump_next_chunk(&mut cursors.backup).await?;
    if !outcome.complete {
        debug!(rows = outcome.rows, "Backup chunk written");
        return Ok(BackupProgress::Pending {
            tables_done: cursors.backup.completed_tables.len(),
            tables_total: cursors.backup.total_tables(),
        });
    }

    let db_version = ctx.adapter.server_version().await?;
    let manifest = database_manifest(run_id, &ctx.settings.site, &db_version, &cursors.backup);
    let path = backup_archive_path(ctx, run_id);

    let mut writer = ArchiveWriter::create(&path)?;
    writer.add_file(DATABASE_FILE, &dump_path)?;
    writer.add_bytes(MANIFEST_FILE, manifest.to_json()?.as_bytes())?;
    writer.finish()?;

    info!(path = %path.display(), tables = cursors.backup.total_tables(), "Pre-import backup written");
    cursors.backup_path = Some(path.clone());
    Ok(BackupProgress::Done(path))
}
