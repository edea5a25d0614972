use crate::{
    context::RuntimeContext,
    controller::{
        StepOutcome, TickHandler, acquire_lock, apply_outcome, check_token, lock_holder,
        parse_options, release_lock, session_response,
    },
    error::MigrationError,
    manifest::build_manifest,
    protocol::{StatusSnapshot, TickAction, TickRequest, TickResponse},
};
use async_trait::async_trait;
use chrono::Utc;
use connectors::archive::{reader::ArchiveReader, writer::ArchiveWriter};
use engine_core::{
    session::{ExportSession, StoredSession},
    state::models::{ExportCursors, SessionKind},
    workspace::{RunLayout, new_run_id, remove_dir_if_exists},
};
use engine_processing::{
    archive::archiver::{ArchiverConfig, BatchArchiver},
    dump::dumper::DatabaseDumper,
    error::ProcessingError,
    scan::enumerator::{FileEnumerator, ScanRoot},
};
use model::{
    files::FileSet,
    manifest::{DATABASE_FILE, MANIFEST_FILE},
    options::ExportOptions,
    parts::parts_manifest_name,
    steps::ExportStep,
    strategy::DumpStrategy,
};
use std::path::PathBuf;
use tracing::info;

/// Drives the export step sequence one tick at a time.
///
/// The batch archiver lives here rather than in the session, so under
/// `keep_open` its writer survives between ticks of the same process.
pub struct ExportController {
    ctx: RuntimeContext,
    holder: String,
    archiver: Option<BatchArchiver>,
}

impl ExportController {
    pub fn new(ctx: RuntimeContext) -> Self {
        ExportController {
            ctx,
            holder: lock_holder(SessionKind::Export),
            archiver: None,
        }
    }

    /// Starts a new export run, replacing any previous export session.
    pub async fn start(&mut self, options: ExportOptions) -> Result<TickResponse, MigrationError> {
        let options = options.normalized();
        self.check_preconditions(&options)?;

        let store = self.ctx.store.clone();
        acquire_lock(store.as_ref(), SessionKind::Export, &self.holder, self.lock_ttl()).await?;
        let result = self.start_locked(options).await;
        release_lock(store.as_ref(), SessionKind::Export, &self.holder).await;
        result
    }

    /// Runs one bounded unit of the current step.
    pub async fn tick(&mut self, token: Option<&str>) -> Result<TickResponse, MigrationError> {
        let store = self.ctx.store.clone();
        acquire_lock(store.as_ref(), SessionKind::Export, &self.holder, self.lock_ttl()).await?;
        let result = self.tick_locked(token).await;
        release_lock(store.as_ref(), SessionKind::Export, &self.holder).await;
        result
    }

    pub async fn status(&self) -> Result<TickResponse, MigrationError> {
        match ExportSession::load(self.ctx.store.as_ref()).await? {
            Some(session) => Ok(session_response(&session, StatusSnapshot::from_export(&session))),
            None => Ok(TickResponse::ok(
                "No export session",
                StatusSnapshot::idle(SessionKind::Export),
            )),
        }
    }

    fn lock_ttl(&self) -> std::time::Duration {
        self.ctx.settings.import.lock_ttl()
    }

    fn check_preconditions(&self, options: &ExportOptions) -> Result<(), MigrationError> {
        for kind in options.categories() {
            let dir = self.ctx.settings.site.dir_for(kind);
            if !dir.is_dir() {
                return Err(MigrationError::Precondition(format!(
                    "Content directory for {kind} not found: {}",
                    dir.display()
                )));
            }
        }
        let output = &self.ctx.settings.paths.output_dir;
        std::fs::create_dir_all(output).map_err(|e| {
            MigrationError::Precondition(format!(
                "Output directory {} is not writable: {e}",
                output.display()
            ))
        })?;
        Ok(())
    }

    async fn start_locked(&mut self, options: ExportOptions) -> Result<TickResponse, MigrationError> {
        let settings = &self.ctx.settings;
        let run_id = new_run_id(Utc::now());
        let layout = RunLayout::new(&run_id, &settings.paths.work_dir, &settings.paths.output_dir);
        let strategy = DumpStrategy::for_mode(
            options.db_export_mode,
            options.db_rows_per_step as u64,
            settings.memory_limit_bytes(),
            settings.batching.memory_fraction,
            settings.batching.table_plan(),
        );

        let cursors = ExportCursors {
            options,
            strategy,
            work_dir: layout.work_dir.clone(),
            archive_path: layout.archive_path(),
            dump_path: layout.dump_path(),
            files: None,
            archive: Default::default(),
            dump: Default::default(),
            manifest: None,
            database_folded: false,
            artifacts: Vec::new(),
            manifest_path: None,
        };

        self.archiver = None;
        let session = ExportSession::start_run(run_id, cursors, self.ctx.store.as_ref()).await?;
        Ok(TickResponse::ok(
            session.message.clone(),
            StatusSnapshot::from_export(&session),
        ))
    }

    async fn tick_locked(&mut self, token: Option<&str>) -> Result<TickResponse, MigrationError> {
        let store = self.ctx.store.clone();
        let Some(mut session) = ExportSession::load(store.as_ref()).await? else {
            return Err(MigrationError::Session(
                "No export session, start one first".into(),
            ));
        };
        check_token(token, &session.session_id)?;

        if !session.is_terminal() {
            session.ticks += 1;
            let outcome = self.run_step(&mut session).await;
            apply_outcome(&mut session, outcome, store.as_ref()).await?;
        }
        Ok(session_response(&session, StatusSnapshot::from_export(&session)))
    }

    async fn run_step(&mut self, session: &mut ExportSession) -> Result<StepOutcome, MigrationError> {
        match session.current_step {
            ExportStep::PrepareExport => prepare_export(&session.cursors),
            ExportStep::ScanFiles => self.scan_files(&mut session.cursors),
            ExportStep::ExportDatabase => self.export_database(&mut session.cursors).await,
            ExportStep::ArchiveFiles => self.archive_files(&mut session.cursors),
            ExportStep::CreateManifest => {
                let run_id = session.run_id.clone();
                self.create_manifest(&run_id, &mut session.cursors).await
            }
            ExportStep::SplitArchive => self.split_archive(&mut session.cursors),
            ExportStep::FinalizeExport => finalize_export(&mut session.cursors),
        }
    }

    fn scan_files(&self, c: &mut ExportCursors) -> Result<StepOutcome, MigrationError> {
        let roots: Vec<ScanRoot> = c
            .options
            .categories()
            .into_iter()
            .map(|kind| ScanRoot::new(kind, self.ctx.settings.site.dir_for(kind)))
            .collect();
        let files = if roots.is_empty() {
            FileSet::new()
        } else {
            FileEnumerator::new(&c.options.exclude_patterns)?.scan(&roots)?
        };
        let message = format!("Found {} files ({} bytes)", files.len(), files.total_bytes());
        c.files = Some(files);
        Ok(StepOutcome::Done(message))
    }

    async fn export_database(&self, c: &mut ExportCursors) -> Result<StepOutcome, MigrationError> {
        if !c.options.include_database {
            return Ok(StepOutcome::Skipped("Database export not selected".into()));
        }
        let dumper = DatabaseDumper::new(self.ctx.adapter.clone(), c.strategy.clone(), &c.dump_path);
        let outcome = dumper.dump_next_chunk(&mut c.dump).await?;
        let dump = &c.dump;
        if outcome.complete {
            Ok(StepOutcome::Done(format!(
                "Database exported: {} tables, {} rows",
                dump.total_tables(),
                dump.rows_written
            )))
        } else {
            Ok(StepOutcome::Pending(format!(
                "Exporting database: {}/{} tables, {}/{} rows",
                dump.completed_tables.len(),
                dump.total_tables(),
                dump.rows_written,
                dump.total_rows()
            )))
        }
    }

    fn archive_files(&mut self, c: &mut ExportCursors) -> Result<StepOutcome, MigrationError> {
        let settings = &self.ctx.settings;
        let files = c.files.as_ref().ok_or_else(|| {
            ProcessingError::InvalidState("file list missing, scan did not run".into())
        })?;
        let archiver = self.archiver.get_or_insert_with(|| {
            BatchArchiver::new(ArchiverConfig {
                base_batch: c.options.files_per_step,
                tiers: settings.batching.file_tiers(),
                small_file_threshold: settings.archive.small_file_threshold(),
                handle_policy: settings.archive.handle_policy,
            })
        });

        let outcome = archiver.archive_next_batch(&c.archive_path, files, &mut c.archive)?;
        if outcome.complete {
            Ok(StepOutcome::Done(format!(
                "Archived {} files ({} skipped)",
                c.archive.files_added, c.archive.files_skipped
            )))
        } else {
            let estimate = c.archive.runtime.estimate(
                files.len().saturating_sub(c.archive.current_index),
                files.remaining_bytes(c.archive.current_index),
            );
            let eta = estimate
                .eta_secs
                .map(|s| format!(", about {s}s left"))
                .unwrap_or_default();
            Ok(StepOutcome::Pending(format!(
                "Archiving files: {}/{}{eta}",
                c.archive.current_index,
                files.len()
            )))
        }
    }

    async fn create_manifest(
        &self,
        run_id: &str,
        c: &mut ExportCursors,
    ) -> Result<StepOutcome, MigrationError> {
        let db_version = if c.options.include_database {
            self.ctx.adapter.server_version().await?
        } else {
            String::new()
        };
        let manifest = build_manifest(run_id, &self.ctx.settings.site, &db_version, c);
        let json = manifest.to_json()?;

        // a rerun after a crash must not add a second entry
        if !ArchiveReader::open(&c.archive_path)?.contains(MANIFEST_FILE) {
            let mut writer = ArchiveWriter::open_append(&c.archive_path)?;
            writer.add_bytes(MANIFEST_FILE, json.as_bytes())?;
            writer.finish()?;
        }

        let copy = c.archive_path.with_file_name(format!("{run_id}.manifest.json"));
        std::fs::write(&copy, json.as_bytes())?;
        c.manifest = Some(manifest);
        c.manifest_path = Some(copy);
        Ok(StepOutcome::Done("Manifest written".into()))
    }

    fn split_archive(&self, c: &mut ExportCursors) -> Result<StepOutcome, MigrationError> {
        fold_database(c)?;
        let Some(max_part_size) = c.options.split_size_bytes() else {
            c.artifacts = vec![c.archive_path.clone()];
            return Ok(StepOutcome::Done("Archive kept whole".into()));
        };

        let parts = self.ctx.splitter().split(&c.archive_path, max_part_size)?;
        let count = parts.len();
        c.artifacts = parts;
        if count > 1 {
            c.artifacts.push(parts_manifest_path(&c.archive_path));
            Ok(StepOutcome::Done(format!("Archive split into {count} parts")))
        } else {
            Ok(StepOutcome::Done("Archive fits in one part".into()))
        }
    }
}

fn prepare_export(c: &ExportCursors) -> Result<StepOutcome, MigrationError> {
    std::fs::create_dir_all(&c.work_dir)?;
    if let Some(parent) = c.archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(StepOutcome::Done(format!(
        "Run directory ready at {}",
        c.work_dir.display()
    )))
}

fn parts_manifest_path(archive: &std::path::Path) -> PathBuf {
    let base = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    archive.with_file_name(parts_manifest_name(&base))
}

/// Adds the finished dump to the archive once.
fn fold_database(c: &mut ExportCursors) -> Result<(), MigrationError> {
    if !c.options.include_database || c.database_folded {
        return Ok(());
    }
    if !c.dump.is_complete() {
        return Err(ProcessingError::InvalidState("database dump is incomplete".into()).into());
    }
    if !ArchiveReader::open(&c.archive_path)?.contains(DATABASE_FILE) {
        let mut writer = ArchiveWriter::open_append(&c.archive_path)?;
        let bytes = writer.add_file(DATABASE_FILE, &c.dump_path)?;
        writer.finish()?;
        info!(bytes, "Database dump added to archive");
    }
    c.database_folded = true;
    Ok(())
}

/// Folds the dump before the run directory holding it is removed.
fn finalize_export(c: &mut ExportCursors) -> Result<StepOutcome, MigrationError> {
    fold_database(c)?;
    if c.artifacts.is_empty() {
        c.artifacts.push(c.archive_path.clone());
    }
    if !c.artifacts.contains(&c.archive_path) && c.archive_path.exists() {
        std::fs::remove_file(&c.archive_path)?;
    }
    remove_dir_if_exists(&c.work_dir)?;

    let listed: Vec<String> = c.artifacts.iter().map(|p| p.display().to_string()).collect();
    Ok(StepOutcome::Done(format!("Export complete: {}", listed.join(", "))))
}

#[async_trait]
impl TickHandler for ExportController {
    fn kind(&self) -> SessionKind {
        SessionKind::Export
    }

    async fn handle(&mut self, request: TickRequest) -> TickResponse {
        let result = match request.action {
            TickAction::Status => self.status().await,
            TickAction::Advance if request.start => match parse_options(request.options) {
                Ok(options) => self.start(options).await,
                Err(e) => Err(e),
            },
            TickAction::Advance => self.tick(request.session_token.as_deref()).await,
        };
        match result {
            Ok(response) => response,
            Err(e) => {
                let status = match ExportSession::load(self.ctx.store.as_ref()).await {
                    Ok(Some(session)) => StatusSnapshot::from_export(&session),
                    _ => StatusSnapshot::idle(SessionKind::Export),
                };
                TickResponse::failed(e.to_string(), status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{context, populate_site, settings, source_database};
    use connectors::sql::memory::adapter::MemoryAdapter;
    use std::{path::Path, time::Duration};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    async fn run_to_end(controller: &mut ExportController) -> TickResponse {
        for _ in 0..50 {
            let response = controller.tick(None).await.unwrap();
            if response.status.is_terminal() {
                return response;
            }
        }
        panic!("export did not finish");
    }

    #[traced_test]
    #[tokio::test]
    async fn exports_files_and_database_into_one_archive() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let mut controller = ExportController::new(context(settings, source_database().await));

        let started = controller.start(ExportOptions::default()).await.unwrap();
        assert!(started.success);
        assert_eq!(started.status.step.as_deref(), Some("prepare_export"));

        let done = run_to_end(&mut controller).await;
        assert!(done.success, "{}", done.message);
        assert!(done.status.completed);
        assert_eq!(done.status.progress_percent, 100.0);
        assert!(done.message.starts_with("Export complete"));

        let archive = PathBuf::from(&done.status.progress.artifacts[0]);
        let reader = ArchiveReader::open(&archive).unwrap();
        assert!(reader.contains(MANIFEST_FILE));
        assert!(reader.contains(DATABASE_FILE));
        assert!(reader.contains("uploads/2024/01/photo.jpg"));
        assert!(reader.contains("themes/plain/style.css"));
        assert!(!reader.contains("uploads/debug.log"));

        let run_id = done.status.run_id.unwrap();
        assert!(!tmp.path().join("work").join(&run_id).exists());
        assert!(tmp.path().join("exports").join(format!("{run_id}.manifest.json")).exists());
    }

    #[tokio::test]
    async fn unselected_database_step_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let adapter = source_database().await;
        let mut controller = ExportController::new(context(settings, adapter.clone()));

        let options = ExportOptions {
            include_database: false,
            include_plugins: false,
            ..ExportOptions::default()
        };
        controller.start(options).await.unwrap();
        let done = run_to_end(&mut controller).await;

        assert!(done.status.completed);
        assert_eq!(done.status.skipped_steps, vec!["export_database".to_string()]);
        assert_eq!(adapter.fetch_count().await, 0);

        let reader = ArchiveReader::open(Path::new(&done.status.progress.artifacts[0])).unwrap();
        assert!(!reader.contains(DATABASE_FILE));
        assert!(!reader.contains("plugins/forms/forms.php"));
    }

    #[tokio::test]
    async fn missing_content_directory_fails_before_a_session_exists() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "nowhere", "https://old.example");
        let mut controller = ExportController::new(context(settings, MemoryAdapter::new()));

        let err = controller.start(ExportOptions::default()).await.unwrap_err();
        assert_eq!(err.code().as_str(), "precondition");

        let status = controller.status().await.unwrap();
        assert!(status.status.session_token.is_none());
    }

    #[tokio::test]
    async fn tick_without_session_is_a_session_error() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "");
        let mut controller = ExportController::new(context(settings, MemoryAdapter::new()));

        let err = controller.tick(None).await.unwrap_err();
        assert_eq!(err.code().as_str(), "session");
    }

    #[tokio::test]
    async fn concurrent_tick_is_rejected_while_locked() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let ctx = context(settings, source_database().await);
        let mut controller = ExportController::new(ctx.clone());
        controller.start(ExportOptions::default()).await.unwrap();

        assert!(ctx.store.try_lock(SessionKind::Export, "other", Duration::from_secs(60)).await.unwrap());
        let err = controller.tick(None).await.unwrap_err();
        assert_eq!(err.code().as_str(), "busy");

        let status = controller.status().await.unwrap();
        assert_eq!(status.status.ticks, 0);
    }

    #[tokio::test]
    async fn foreign_token_is_rejected_and_state_kept() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let mut controller = ExportController::new(context(settings, source_database().await));
        let started = controller.start(ExportOptions::default()).await.unwrap();
        let token = started.status.session_token.unwrap();

        let response = controller
            .handle(TickRequest::advance(SessionKind::Export, Some("not-it".into())))
            .await;
        assert!(!response.success);
        assert_eq!(response.status.step_index, 0);

        let response = controller
            .handle(TickRequest::advance(SessionKind::Export, Some(token)))
            .await;
        assert!(response.success);
        assert_eq!(response.status.step_index, 1);
    }

    #[tokio::test]
    async fn step_failure_is_terminal_and_repeated() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let adapter = source_database().await;
        adapter.fail_on("wp_options").await;
        let mut controller = ExportController::new(context(settings, adapter));
        controller.start(ExportOptions::default()).await.unwrap();

        let failed = run_to_end(&mut controller).await;
        assert!(!failed.success);
        assert_eq!(failed.status.step.as_deref(), Some("export_database"));
        assert_eq!(failed.status.error_code.as_deref(), Some("step_execution"));

        let again = controller.tick(None).await.unwrap();
        assert!(!again.success);
        assert_eq!(again.status.ticks, failed.status.ticks);
        assert_eq!(again.message, failed.message);
    }

    #[tokio::test]
    async fn start_request_parses_options() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), "site", "https://old.example");
        populate_site(&settings);
        let mut controller = ExportController::new(context(settings, MemoryAdapter::new()));

        let response = controller
            .handle(TickRequest::start(
                SessionKind::Export,
                Some(serde_json::json!({"files_per_step": 500, "split_size": 0})),
            ))
            .await;
        assert!(response.success);

        let session = ExportSession::load(controller.ctx.store.as_ref()).await.unwrap().unwrap();
        assert_eq!(session.cursors.options.files_per_step, 200);
        assert_eq!(session.cursors.options.split_size_bytes(), None);
    }
}
