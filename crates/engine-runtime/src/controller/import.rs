use crate::{
    backup::{BackupProgress, backup_next_chunk},
    context::RuntimeContext,
    controller::{
        StepOutcome, TickHandler, acquire_lock, apply_outcome, check_token, lock_holder,
        parse_options, release_lock, session_response,
    },
    error::MigrationError,
    protocol::{StatusSnapshot, TickAction, TickRequest, TickResponse},
};
use async_trait::async_trait;
use chrono::Utc;
use connectors::archive::reader::ArchiveReader;
use engine_core::{
    session::{ImportSession, StoredSession},
    split::sort_parts,
    state::models::{ImportCursors, SessionKind},
    workspace::{RunLayout, new_run_id, remove_dir_if_exists},
};
use engine_processing::{
    error::ProcessingError,
    import::{
        database::SqlImporter,
        files::{FileImporter, enumerate_extracted},
        urls::UrlRewriter,
    },
};
use model::{
    manifest::{DATABASE_FILE, MANIFEST_FILE, Manifest, TargetSite},
    options::ImportOptions,
    parts::parse_part_number,
    steps::{ImportStep, StepSequence},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const COMBINED_ARCHIVE: &str = "combined.zip";
const URL_PAGE_SIZE: u64 = 500;

/// Drives the import step sequence one tick at a time.
pub struct ImportController {
    ctx: RuntimeContext,
    holder: String,
}

impl ImportController {
    pub fn new(ctx: RuntimeContext) -> Self {
        ImportController {
            ctx,
            holder: lock_holder(SessionKind::Import),
        }
    }

    /// Starts a new import run, replacing any previous import session.
    pub async fn start(&mut self, options: ImportOptions) -> Result<TickResponse, MigrationError> {
        check_archives(&options.archive)?;

        let store = self.ctx.store.clone();
        let ttl = self.ctx.settings.import.lock_ttl();
        acquire_lock(store.as_ref(), SessionKind::Import, &self.holder, ttl).await?;
        let result = self.start_locked(options).await;
        release_lock(store.as_ref(), SessionKind::Import, &self.holder).await;
        result
    }

    pub async fn tick(&mut self, token: Option<&str>) -> Result<TickResponse, MigrationError> {
        let store = self.ctx.store.clone();
        let ttl = self.ctx.settings.import.lock_ttl();
        acquire_lock(store.as_ref(), SessionKind::Import, &self.holder, ttl).await?;
        let result = self.tick_locked(token).await;
        release_lock(store.as_ref(), SessionKind::Import, &self.holder).await;
        result
    }

    pub async fn status(&self) -> Result<TickResponse, MigrationError> {
        match ImportSession::load(self.ctx.store.as_ref()).await? {
            Some(session) => Ok(session_response(&session, StatusSnapshot::from_import(&session))),
            None => Ok(TickResponse::ok(
                "No import session",
                StatusSnapshot::idle(SessionKind::Import),
            )),
        }
    }

    async fn start_locked(&mut self, options: ImportOptions) -> Result<TickResponse, MigrationError> {
        let settings = &self.ctx.settings;
        let run_id = new_run_id(Utc::now());
        let layout = RunLayout::new(&run_id, &settings.paths.work_dir, &settings.paths.output_dir);
        let cursors = ImportCursors {
            options,
            work_dir: layout.work_dir.clone(),
            ..ImportCursors::default()
        };
        let session = ImportSession::start_run(run_id, cursors, self.ctx.store.as_ref()).await?;
        Ok(TickResponse::ok(
            session.message.clone(),
            StatusSnapshot::from_import(&session),
        ))
    }

    async fn tick_locked(&mut self, token: Option<&str>) -> Result<TickResponse, MigrationError> {
        let store = self.ctx.store.clone();
        let Some(mut session) = ImportSession::load(store.as_ref()).await? else {
            return Err(MigrationError::Session(
                "No import session, start one first".into(),
            ));
        };
        check_token(token, &session.session_id)?;

        if !session.is_terminal() {
            session.ticks += 1;
            session.cursors.current_operation = session.current_step.as_str().to_string();
            let outcome = self.run_step(&mut session).await;
            apply_outcome(&mut session, outcome, store.as_ref()).await?;
        }
        Ok(session_response(&session, StatusSnapshot::from_import(&session)))
    }

    async fn run_step(&self, session: &mut ImportSession) -> Result<StepOutcome, MigrationError> {
        let c = &mut session.cursors;
        match session.current_step {
            ImportStep::UploadFile => self.upload_file(c),
            ImportStep::ExtractArchive => extract_archive(c),
            ImportStep::ValidateManifest => self.validate_manifest(c),
            ImportStep::BackupCurrentSite => self.backup_current_site(&session.run_id, c).await,
            ImportStep::ImportDatabase => self.import_database(c).await,
            ImportStep::ImportFiles => self.import_files(c),
            ImportStep::UpdateUrls => self.update_urls(c).await,
            ImportStep::Cleanup => {
                remove_dir_if_exists(&c.work_dir)?;
                Ok(StepOutcome::Done("Import complete".into()))
            }
        }
    }

    /// Resolves the uploaded archive, joining split parts into one file.
    fn upload_file(&self, c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
        check_archives(&c.options.archive)?;
        if let [single] = c.options.archive.as_slice() {
            if !is_part(single) {
                c.archive_path = Some(single.clone());
                return Ok(StepOutcome::Done(format!("Using archive {}", single.display())));
            }
        }

        let parts = sort_parts(&c.options.archive)?;
        let splitter = self.ctx.splitter();
        if !splitter.verify(&parts) {
            return Err(MigrationError::Validation(
                "Archive parts are incomplete or corrupted".into(),
            ));
        }
        std::fs::create_dir_all(&c.work_dir)?;
        let target = c.work_dir.join(COMBINED_ARCHIVE);
        let bytes = splitter.combine(&parts, &target)?;
        c.archive_path = Some(target);
        Ok(StepOutcome::Done(format!(
            "Combined {} parts ({bytes} bytes)",
            parts.len()
        )))
    }

    fn validate_manifest(&self, c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
        let extracted = extracted_dir(c)?;
        let path = extracted.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(MigrationError::Validation(format!(
                "Archive has no {MANIFEST_FILE}"
            )));
        }
        let manifest = Manifest::parse(&std::fs::read(&path)?)?;
        let site = &self.ctx.settings.site;
        manifest.validate(&TargetSite {
            cms_version: site.cms_version.clone(),
            runtime_version: site.runtime_version.clone(),
        })?;
        if manifest.contents.includes_database && !extracted.join(DATABASE_FILE).is_file() {
            return Err(MigrationError::Validation(format!(
                "Manifest lists a database but {DATABASE_FILE} is missing"
            )));
        }

        let message = format!(
            "Manifest from {} accepted ({} files, {} tables)",
            manifest.source.url, manifest.contents.files, manifest.contents.tables
        );
        c.manifest = Some(manifest);
        Ok(StepOutcome::Done(message))
    }

    /// A failed backup does not abort the import.
    async fn backup_current_site(
        &self,
        run_id: &str,
        c: &mut ImportCursors,
    ) -> Result<StepOutcome, MigrationError> {
        if c.options.skip_backup {
            return Ok(StepOutcome::Skipped("Backup disabled".into()));
        }
        match backup_next_chunk(&self.ctx, run_id, c).await {
            Ok(BackupProgress::Pending {
                tables_done,
                tables_total,
            }) => Ok(StepOutcome::Pending(format!(
                "Backing up database: {tables_done}/{tables_total} tables"
            ))),
            Ok(BackupProgress::Done(path)) => Ok(StepOutcome::Done(format!(
                "Backup written to {}",
                path.display()
            ))),
            Err(e) => {
                warn!(error = %e, "Pre-import backup failed, continuing without it");
                c.backup_skipped = true;
                Ok(StepOutcome::Skipped(format!("Backup failed: {e}")))
            }
        }
    }

    async fn import_database(&self, c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
        if !manifest_of(c)?.contents.includes_database {
            return Ok(StepOutcome::Skipped("Archive has no database".into()));
        }
        let dump = extracted_dir(c)?.join(DATABASE_FILE);
        let importer = SqlImporter::new(
            self.ctx.adapter.clone(),
            dump,
            self.ctx.settings.import.statements_per_step,
        );
        let outcome = importer.import_next_batch(c).await?;
        if outcome.complete {
            Ok(StepOutcome::Done(format!(
                "Database imported: {} statements",
                c.statements_executed
            )))
        } else {
            Ok(StepOutcome::Pending(format!(
                "Importing database: {} statements",
                c.statements_executed
            )))
        }
    }

    fn import_files(&self, c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
        let files = match c.files.take() {
            Some(files) => files,
            None => enumerate_extracted(&extracted_dir(c)?)?,
        };
        let importer = FileImporter::new(&self.ctx.settings.site, self.ctx.settings.import.files_per_step);
        let outcome = importer.import_next_batch(&files, c);
        let total = files.len();
        c.files = Some(files);
        let outcome = outcome?;

        if outcome.complete {
            Ok(StepOutcome::Done(format!(
                "Imported {} files",
                c.files_imported.len()
            )))
        } else {
            Ok(StepOutcome::Pending(format!(
                "Importing files: {}/{total}",
                c.file_index
            )))
        }
    }

    async fn update_urls(&self, c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
        let target = c
            .options
            .site_url
            .clone()
            .unwrap_or_else(|| self.ctx.settings.site.url.clone());
        let manifest = manifest_of(c)?;
        if !manifest.contents.includes_database {
            return Ok(StepOutcome::Skipped("Archive has no database".into()));
        }
        if target.trim().is_empty() {
            return Ok(StepOutcome::Skipped("No target site URL configured".into()));
        }
        if manifest.source.url.trim().is_empty() {
            return Ok(StepOutcome::Skipped("Archive has no source URL".into()));
        }

        let rewriter = UrlRewriter::new(
            self.ctx.adapter.clone(),
            &manifest.source.table_prefix,
            URL_PAGE_SIZE,
        );
        let summary = rewriter.rewrite(&manifest.source.url, target.trim()).await?;
        info!(
            tables = summary.tables,
            scanned = summary.rows_scanned,
            updated = summary.rows_updated,
            "URLs rewritten"
        );
        c.rows_rewritten = summary.rows_updated;
        Ok(StepOutcome::Done(format!(
            "Rewrote URLs in {} rows",
            summary.rows_updated
        )))
    }
}

fn check_archives(archive: &[PathBuf]) -> Result<(), MigrationError> {
    if archive.is_empty() {
        return Err(MigrationError::Precondition("No archive given".into()));
    }
    if let Some(missing) = archive.iter().find(|p| !p.is_file()) {
        return Err(MigrationError::Precondition(format!(
            "Archive not found: {}",
            missing.display()
        )));
    }
    Ok(())
}

fn is_part(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_part_number)
        .is_some()
}

fn extract_archive(c: &mut ImportCursors) -> Result<StepOutcome, MigrationError> {
    let archive = c.archive_path.clone().ok_or_else(|| {
        ProcessingError::InvalidState("archive path missing, upload did not run".into())
    })?;
    let dir = c.work_dir.join("extracted");
    remove_dir_if_exists(&dir)?;
    std::fs::create_dir_all(&dir)?;
    let entries = ArchiveReader::open(&archive)?.extract_to(&dir)?;
    c.extracted_dir = Some(dir);
    Ok(StepOutcome::Done(format!("Extracted {entries} entries")))
}

fn extracted_dir(c: &ImportCursors) -> Result<PathBuf, MigrationError> {
    c.extracted_dir.clone().ok_or_else(|| {
        ProcessingError::InvalidState("archive was not extracted".into()).into()
    })
}

fn manifest_of(c: &ImportCursors) -> Result<&Manifest, MigrationError> {
    c.manifest.as_ref().ok_or_else(|| {
        ProcessingError::InvalidState("manifest was not validated".into()).into()
    })
}

#[async_trait]
impl TickHandler for ImportController {
    fn kind(&self) -> SessionKind {
        SessionKind::Import
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
                let status = match ImportSession::load(self.ctx.store.as_ref()).await {
                    Ok(Some(session)) => StatusSnapshot::from_import(&session),
                    _ => StatusSnapshot::idle(SessionKind::Import),
                };
                TickResponse::failed(e.to_string(), status)
            }
        }
    }
}
