use crate::{
    dump::statement::SESSION_PRELUDE, error::ProcessingError, import::statements::read_statements,
};
use connectors::sql::base::adapter::SqlAdapter;
use engine_core::state::models::ImportCursors;
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlImportOutcome {
    pub executed: usize,
    pub complete: bool,
}

/// Replays a SQL dump against the target database a bounded number of
/// statements per call, resuming from the byte offset kept in the cursor.
pub struct SqlImporter {
    adapter: Arc<dyn SqlAdapter>,
    path: PathBuf,
    statements_per_step: usize,
}

impl SqlImporter {
    pub fn new(adapter: Arc<dyn SqlAdapter>, path: impl Into<PathBuf>, statements_per_step: usize) -> Self {
        SqlImporter {
            adapter,
            path: path.into(),
            statements_per_step,
        }
    }

    pub async fn import_next_batch(
        &self,
        cursor: &mut ImportCursors,
    ) -> Result<SqlImportOutcome, ProcessingError> {
        if cursor.sql_done {
            return Ok(SqlImportOutcome {
                executed: 0,
                complete: true,
            });
        }

        let batch = read_statements(&self.path, cursor.sql_offset, self.statements_per_step)?;
        let mut outcome = SqlImportOutcome::default();
        if !batch.statements.is_empty() {
            // every batch may land on a fresh connection, so the prelude
            // is replayed ahead of the dump's own statements
            let mut queries: Vec<String> = SESSION_PRELUDE.iter().map(|s| s.to_string()).collect();
            queries.extend(batch.statements.iter().map(|s| s.sql.clone()));

            if let Err(err) = self.adapter.exec_batch(&queries).await {
                // a failed statement keeps the offset on itself
                let done = err.executed.saturating_sub(SESSION_PRELUDE.len());
                if let Some(last) = done.checked_sub(1).and_then(|i| batch.statements.get(i)) {
                    cursor.sql_offset = last.end_offset;
                }
                cursor.statements_executed += done as u64;
                return Err(err.source.into());
            }
            outcome.executed = batch.statements.len();
            cursor.statements_executed += outcome.executed as u64;
        }
        cursor.sql_offset = batch.next_offset;

        debug!(
            executed = outcome.executed,
            offset = cursor.sql_offset,
            "Executed SQL batch"
        );

        if batch.eof {
            cursor.sql_done = true;
            outcome.complete = true;
            info!(
                statements = cursor.statements_executed,
                "Database import complete"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sql::memory::adapter::MemoryAdapter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn executes_in_bounded_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.sql");
        let body: String = (1..=7).map(|i| format!("INSERT INTO `t` VALUES ({i});\n")).collect();
        std::fs::write(&path, body).unwrap();

        let adapter = MemoryAdapter::new();
        let importer = SqlImporter::new(Arc::new(adapter.clone()), &path, 3);
        let mut cursor = ImportCursors::default();

        let mut calls = 0;
        loop {
            calls += 1;
            if importer.import_next_batch(&mut cursor).await.unwrap().complete {
                break;
            }
        }
        assert_eq!(calls, 3);
        assert_eq!(cursor.statements_executed, 7);
        let executed = adapter.executed().await;
        assert_eq!(executed.len(), 7 + 3 * SESSION_PRELUDE.len());
        assert_eq!(executed.last().unwrap(), "INSERT INTO `t` VALUES (7)");
    }

    #[tokio::test]
    async fn prelude_is_replayed_before_each_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.sql");
        std::fs::write(
            &path,
            "SET NAMES utf8mb4;\nSET foreign_key_checks = 0;\n\
             DROP TABLE IF EXISTS `parent`;\nCREATE TABLE `parent` (id INT);\n\
             INSERT INTO `child` VALUES (1);\nSET foreign_key_checks = 1;\n",
        )
        .unwrap();

        let adapter = MemoryAdapter::new();
        let importer = SqlImporter::new(Arc::new(adapter.clone()), &path, 3);
        let mut cursor = ImportCursors::default();
        while !importer.import_next_batch(&mut cursor).await.unwrap().complete {}

        let executed = adapter.executed().await;
        let prelude: Vec<String> = SESSION_PRELUDE.iter().map(|s| s.to_string()).collect();
        assert_eq!(executed.len(), 6 + 2 * prelude.len());
        // second batch starts after the first batch's prelude and 3 statements
        assert_eq!(executed[..2], prelude[..]);
        assert_eq!(executed[5..7], prelude[..]);
        assert_eq!(executed[7], "CREATE TABLE `parent` (id INT)");
        assert_eq!(cursor.statements_executed, 6);
    }

    #[tokio::test]
    async fn empty_tail_runs_no_prelude() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.sql");
        std::fs::write(&path, "-- nothing but a comment\n").unwrap();

        let adapter = MemoryAdapter::new();
        let importer = SqlImporter::new(Arc::new(adapter.clone()), &path, 3);
        let mut cursor = ImportCursors::default();
        assert!(importer.import_next_batch(&mut cursor).await.unwrap().complete);
        assert!(adapter.executed().await.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_offset_on_failed_statement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.sql");
        std::fs::write(&path, "SELECT 1;\nSELECT 'boom';\nSELECT 3;\n").unwrap();

        let adapter = MemoryAdapter::new();
        adapter.fail_on("boom").await;
        let importer = SqlImporter::new(Arc::new(adapter), &path, 10);
        let mut cursor = ImportCursors::default();

        assert!(importer.import_next_batch(&mut cursor).await.is_err());
        assert_eq!(cursor.statements_executed, 1);
        assert_eq!(cursor.sql_offset, "SELECT 1;".len() as u64);
        assert!(!cursor.sql_done);
    }
}
