use crate::{archive::batch_size::next_batch_size, error::ProcessingError};
use connectors::archive::{error::ArchiveError, writer::ArchiveWriter};
use engine_config::settings::HandlePolicy;
use engine_core::{progress::BatchSample, state::models::ArchiveCursor};
use model::{files::FileSet, manifest::PLACEHOLDER_FILE, strategy::FileBatchTiers};
use std::{
    io,
    path::Path,
    time::Instant,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// Look-ahead base for batch sizing (the run's `files_per_step`).
    pub base_batch: usize,
    pub tiers: FileBatchTiers,
    /// Files below this size are read into memory; larger ones are streamed.
    pub small_file_threshold: u64,
    pub handle_policy: HandlePolicy,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub batch_size: usize,
    pub files_added: usize,
    pub files_skipped: usize,
    pub bytes_added: u64,
    pub complete: bool,
}

/// Appends files to one archive over many ticks.
///
/// With [`HandlePolicy::KeepOpen`] the writer outlives a tick and is only
/// finished at completion; otherwise it is reopened in append mode each tick.
pub struct BatchArchiver {
    config: ArchiverConfig,
    writer: Option<ArchiveWriter>,
}

impl BatchArchiver {
    pub fn new(config: ArchiverConfig) -> Self {
        BatchArchiver {
            config,
            writer: None,
        }
    }

    pub fn has_open_handle(&self) -> bool {
        self.writer.is_some()
    }

    /// Adds the next batch of `files` starting at `cursor.current_index`.
    pub fn archive_next_batch(
        &mut self,
        archive_path: &Path,
        files: &FileSet,
        cursor: &mut ArchiveCursor,
    ) -> Result<BatchOutcome, ProcessingError> {
        let started = Instant::now();
        self.ensure_writer(archive_path, cursor)?;

        let remaining = files.len().saturating_sub(cursor.current_index);
        let batch_size = next_batch_size(
            files.remaining_sizes(cursor.current_index),
            self.config.base_batch,
            &self.config.tiers,
        );
        let mut outcome = BatchOutcome {
            batch_size,
            ..BatchOutcome::default()
        };

        let writer = self.writer.as_mut().ok_or_else(|| {
            ProcessingError::InvalidState("archive writer not open".into())
        })?;
        let end = cursor.current_index + batch_size;
        for idx in cursor.current_index..end {
            let path = &files.paths[idx];
            let name = &files.relative[idx];
            match add_one(writer, name, path, self.config.small_file_threshold) {
                Ok(bytes) => {
                    outcome.files_added += 1;
                    outcome.bytes_added += bytes;
                }
                Err(ArchiveError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "File vanished before archiving, skipping");
                    outcome.files_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        cursor.current_index = end;
        cursor.files_added += outcome.files_added;
        cursor.files_skipped += outcome.files_skipped;
        cursor.bytes_added += outcome.bytes_added;
        cursor.batches += 1;
        cursor.last_batch_size = batch_size;

        outcome.complete = batch_size == remaining;
        if outcome.complete {
            if cursor.files_added == 0 {
                writer.add_bytes(PLACEHOLDER_FILE, b"")?;
            }
            self.close(cursor)?;
            info!(
                files = cursor.files_added,
                skipped = cursor.files_skipped,
                bytes = cursor.bytes_added,
                "Archiving complete"
            );
        } else if self.config.handle_policy == HandlePolicy::ReopenPerBatch {
            self.close(cursor)?;
        } else {
            cursor.handle_open = true;
        }

        cursor.runtime.record(BatchSample {
            millis: started.elapsed().as_millis() as u64,
            files: batch_size,
            bytes: outcome.bytes_added,
        });
        debug!(
            batch = batch_size,
            index = cursor.current_index,
            total = files.len(),
            "Archived batch"
        );
        Ok(outcome)
    }

    /// Finishes the open writer, if any.
    pub fn close(&mut self, cursor: &mut ArchiveCursor) -> Result<(), ProcessingError> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        cursor.handle_open = false;
        Ok(())
    }

    fn ensure_writer(
        &mut self,
        archive_path: &Path,
        cursor: &mut ArchiveCursor,
    ) -> Result<(), ProcessingError> {
        if self.writer.is_some() {
            return Ok(());
        }
        if cursor.handle_open {
            // A writer was open in a process that is gone; its entries were
            // never finalized.
            return self.rebuild(archive_path, cursor, "archive handle was lost");
        }
        if !cursor.created {
            return self.create(archive_path, cursor);
        }

        match ArchiveWriter::open_append(archive_path) {
            Ok(writer) if writer.entry_count() == cursor.files_added => {
                self.writer = Some(writer);
                Ok(())
            }
            Ok(writer) => {
                let found = writer.entry_count();
                drop(writer);
                self.rebuild(
                    archive_path,
                    cursor,
                    &format!(
                        "archive has {found} entries, expected {}",
                        cursor.files_added
                    ),
                )
            }
            Err(e) => self.rebuild(archive_path, cursor, &e.to_string()),
        }
    }

    fn create(
        &mut self,
        archive_path: &Path,
        cursor: &mut ArchiveCursor,
    ) -> Result<(), ProcessingError> {
        self.writer = Some(ArchiveWriter::create(archive_path)?);
        cursor.created = true;
        Ok(())
    }

    /// Starts over from the first file. Work may be redone, never skipped.
    fn rebuild(
        &mut self,
        archive_path: &Path,
        cursor: &mut ArchiveCursor,
        reason: &str,
    ) -> Result<(), ProcessingError> {
        warn!(path = %archive_path.display(), reason, "Rebuilding archive from the first file");
        let rebuilds = cursor.rebuilds + 1;
        *cursor = ArchiveCursor {
            rebuilds,
            ..ArchiveCursor::default()
        };
        self.create(archive_path, cursor)
    }
}

fn add_one(
    writer: &mut ArchiveWriter,
    name: &str,
    path: &Path,
    small_file_threshold: u64,
) -> Result<u64, ArchiveError> {
    let size = std::fs::metadata(path)?.len();
    if size < small_file_threshold {
        let data = std::fs::read(path)?;
        writer.add_bytes(name, &data)?;
        Ok(data.len() as u64)
    } else {
        writer.add_file(name, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::archive::reader::ArchiveReader;
    use tempfile::{TempDir, tempdir};
    use tracing_test::traced_test;

    fn config(policy: HandlePolicy) -> ArchiverConfig {
        ArchiverConfig {
            base_batch: 2,
            tiers: FileBatchTiers {
                small_batch: 3,
                ..FileBatchTiers::default()
            },
            small_file_threshold: 16,
            handle_policy: policy,
        }
    }

    fn fixture(count: usize) -> (TempDir, FileSet) {
        let dir = tempdir().unwrap();
        let mut files = FileSet::new();
        for i in 0..count {
            let path = dir.path().join(format!("f{i}.bin"));
            // alternate between in-memory and streamed files
            let len = if i % 2 == 0 { 8 } else { 64 };
            std::fs::write(&path, vec![i as u8; len]).unwrap();
            files.push(path, len as u64, format!("uploads/f{i}.bin"));
        }
        (dir, files)
    }

    fn run_to_completion(
        archiver: &mut BatchArchiver,
        path: &Path,
        files: &FileSet,
        cursor: &mut ArchiveCursor,
    ) -> usize {
        let mut ticks = 0;
        loop {
            let outcome = archiver.archive_next_batch(path, files, cursor).unwrap();
            ticks += 1;
            assert!(cursor.current_index <= files.len());
            if outcome.complete {
                return ticks;
            }
        }
    }

    #[test]
    fn reopen_policy_appends_every_file_once() {
        let (dir, files) = fixture(7);
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();

        let ticks = {
            let mut archiver = BatchArchiver::new(config(HandlePolicy::ReopenPerBatch));
            let ticks = run_to_completion(&mut archiver, &path, &files, &mut cursor);
            assert!(!archiver.has_open_handle());
            ticks
        };
        assert_eq!(ticks, 3);
        assert_eq!(cursor.current_index, 7);
        assert_eq!(cursor.files_added, 7);
        assert_eq!(cursor.runtime.len(), 3);

        let reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.len(), 7);
    }

    #[test]
    fn keep_open_finishes_on_completion() {
        let (dir, files) = fixture(5);
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();
        let mut archiver = BatchArchiver::new(config(HandlePolicy::KeepOpen));

        archiver.archive_next_batch(&path, &files, &mut cursor).unwrap();
        assert!(cursor.handle_open);
        assert!(archiver.has_open_handle());

        run_to_completion(&mut archiver, &path, &files, &mut cursor);
        assert!(!cursor.handle_open);
        assert_eq!(ArchiveReader::open(&path).unwrap().len(), 5);
    }

    #[traced_test]
    #[test]
    fn lost_handle_rebuilds_from_start() {
        let (dir, files) = fixture(6);
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();

        let mut first = BatchArchiver::new(config(HandlePolicy::KeepOpen));
        first.archive_next_batch(&path, &files, &mut cursor).unwrap();
        assert_eq!(cursor.current_index, 3);
        // process restart: the in-memory writer is gone
        std::mem::forget(first);

        let mut second = BatchArchiver::new(config(HandlePolicy::KeepOpen));
        run_to_completion(&mut second, &path, &files, &mut cursor);
        assert!(logs_contain("Rebuilding archive"));
        assert_eq!(cursor.rebuilds, 1);
        assert_eq!(cursor.files_added, 6);
        assert_eq!(ArchiveReader::open(&path).unwrap().len(), 6);
    }

    #[test]
    fn stale_cursor_after_crash_rebuilds() {
        let (dir, files) = fixture(6);
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();
        let mut archiver = BatchArchiver::new(config(HandlePolicy::ReopenPerBatch));

        archiver.archive_next_batch(&path, &files, &mut cursor).unwrap();
        let saved = cursor.clone();
        archiver.archive_next_batch(&path, &files, &mut cursor).unwrap();
        // the second batch reached disk but its cursor update did not
        let mut cursor = saved;
        run_to_completion(&mut archiver, &path, &files, &mut cursor);
        assert_eq!(cursor.rebuilds, 1);
        assert_eq!(ArchiveReader::open(&path).unwrap().len(), 6);
    }

    #[traced_test]
    #[test]
    fn vanished_files_are_skipped() {
        let (dir, files) = fixture(4);
        std::fs::remove_file(&files.paths[1]).unwrap();
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();
        let mut archiver = BatchArchiver::new(config(HandlePolicy::ReopenPerBatch));

        run_to_completion(&mut archiver, &path, &files, &mut cursor);
        assert_eq!(cursor.files_added, 3);
        assert_eq!(cursor.files_skipped, 1);
        assert_eq!(cursor.current_index, 4);
        assert!(logs_contain("File vanished"));
    }

    #[test]
    fn empty_set_writes_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.zip");
        let mut cursor = ArchiveCursor::default();
        let mut archiver = BatchArchiver::new(config(HandlePolicy::ReopenPerBatch));

        let outcome = archiver
            .archive_next_batch(&path, &FileSet::new(), &mut cursor)
            .unwrap();
        assert!(outcome.complete);
        let reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.entry_names(), vec![PLACEHOLDER_FILE]);
    }
}
