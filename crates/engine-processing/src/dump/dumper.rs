use crate::{
    dump::{
        planner::plan_batches,
        statement::{
            SESSION_PRELUDE, bulk_insert, insert_row, structure_statements, validate_bulk_insert,
        },
        writer::DumpFile,
    },
    error::ProcessingError,
};
use connectors::sql::base::{adapter::SqlAdapter, requests::FetchRowsRequest};
use engine_core::state::models::{DumpCursor, TableInfo};
use model::{
    manifest::GENERATOR_NAME,
    records::row::RowData,
    strategy::{DumpStrategy, InsertStyle},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutcome {
    /// Tables touched by this chunk.
    pub tables: Vec<String>,
    pub rows: u64,
    pub bytes: u64,
    pub bulk_fallback: bool,
    pub complete: bool,
}

/// Writes the database as SQL text, one bounded chunk per call.
///
/// The chunk is assembled in memory, appended to the dump file, and only
/// then copied into the caller's cursor, so a failed call leaves the cursor
/// where it was.
pub struct DatabaseDumper {
    adapter: Arc<dyn SqlAdapter>,
    strategy: DumpStrategy,
    path: PathBuf,
}

impl DatabaseDumper {
    pub fn new(adapter: Arc<dyn SqlAdapter>, strategy: DumpStrategy, path: impl Into<PathBuf>) -> Self {
        DatabaseDumper {
            adapter,
            strategy,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn dump_next_chunk(
        &self,
        cursor: &mut DumpCursor,
    ) -> Result<ChunkOutcome, ProcessingError> {
        if cursor.is_complete() {
            return Ok(ChunkOutcome {
                complete: true,
                ..ChunkOutcome::default()
            });
        }

        let mut next = cursor.clone();
        let mut sql = String::new();
        let mut outcome = ChunkOutcome::default();

        if !next.is_started() {
            self.discover(&mut next).await?;
        }
        if !next.header_written {
            sql.push_str(&dump_header());
            next.header_written = true;
        }

        if let Some(batch) = next.batches.get(next.current_batch_index).cloned() {
            if batch.grouped {
                for table in &batch.tables {
                    while !next.completed_tables.contains(table) {
                        self.dump_table_chunk(table, batch.rows_per_chunk, &mut next, &mut sql, &mut outcome)
                            .await?;
                    }
                }
                next.current_batch_index += 1;
            } else {
                let pending = batch
                    .tables
                    .iter()
                    .find(|t| !next.completed_tables.contains(*t));
                if let Some(table) = pending {
                    self.dump_table_chunk(table, batch.rows_per_chunk, &mut next, &mut sql, &mut outcome)
                        .await?;
                }
                if batch.tables.iter().all(|t| next.completed_tables.contains(t)) {
                    next.current_batch_index += 1;
                }
            }
        }

        if next.current_batch_index >= next.batches.len() && !next.footer_written {
            sql.push_str(&dump_footer());
            next.footer_written = true;
        }

        let mut file = DumpFile::open(&self.path, cursor.committed_len)?;
        next.committed_len = file.append(&sql)?;
        next.chunks_written += 1;
        outcome.bytes = sql.len() as u64;

        *cursor = next;
        outcome.complete = cursor.is_complete();
        if outcome.complete {
            info!(
                tables = cursor.total_tables(),
                rows = cursor.rows_written,
                chunks = cursor.chunks_written,
                bytes = cursor.committed_len,
                "Database dump complete"
            );
        }
        Ok(outcome)
    }

    async fn discover(&self, cursor: &mut DumpCursor) -> Result<(), ProcessingError> {
        let mut tables = Vec::new();
        for name in self.adapter.list_tables().await? {
            let stats = self.adapter.table_stats(&name).await?;
            tables.push(TableInfo {
                name,
                rows: stats.rows,
                avg_row_bytes: stats.avg_row_bytes,
            });
        }
        cursor.batches = plan_batches(&tables, &self.strategy);
        info!(
            tables = tables.len(),
            rows = tables.iter().map(|t| t.rows).sum::<u64>(),
            batches = cursor.batches.len(),
            adaptive = self.strategy.is_adaptive(),
            "Discovered tables"
        );
        cursor.tables = Some(tables);
        Ok(())
    }

    async fn dump_table_chunk(
        &self,
        table: &str,
        limit: u64,
        cursor: &mut DumpCursor,
        sql: &mut String,
        outcome: &mut ChunkOutcome,
    ) -> Result<(), ProcessingError> {
        if cursor.current_table.as_deref() != Some(table) {
            cursor.current_table = Some(table.to_string());
            cursor.table_row_offset = 0;
        }
        let offset = cursor.table_row_offset;
        if offset == 0 {
            let create = self.adapter.create_table_statement(table).await?;
            sql.push_str(&structure_statements(table, &create));
        }

        let rows = self
            .adapter
            .fetch_rows(FetchRowsRequest::new(table, limit, offset))
            .await?;
        let fetched = rows.len() as u64;
        if self.render_rows(table, &rows, sql) {
            cursor.bulk_fallbacks += 1;
            outcome.bulk_fallback = true;
        }

        cursor.table_row_offset += fetched;
        cursor.rows_written += fetched;
        outcome.rows += fetched;
        if !outcome.tables.iter().any(|t| t == table) {
            outcome.tables.push(table.to_string());
        }

        let discovered = discovered_rows(cursor, table);
        debug!(table, offset, fetched, "Dumped chunk");

        if fetched < limit || (discovered > 0 && cursor.table_row_offset >= discovered) {
            if fetched == limit {
                self.warn_if_grown(table, discovered).await;
            }
            info!(table, rows = cursor.table_row_offset, "Table dumped");
            cursor.completed_tables.insert(table.to_string());
            cursor.current_table = None;
            cursor.table_row_offset = 0;
        }
        Ok(())
    }

    /// A full last chunk may hide rows inserted after discovery. Those rows
    /// are not dumped; the current count only decides whether to say so.
    async fn warn_if_grown(&self, table: &str, discovered: u64) {
        match self.adapter.table_stats(table).await {
            Ok(stats) if stats.rows > discovered => warn!(
                table,
                discovered,
                current = stats.rows,
                "Table may have grown since discovery; rows past the discovered count are not dumped"
            ),
            Ok(_) => {}
            Err(e) => debug!(table, error = %e, "Could not recount table"),
        }
    }

    /// Appends INSERT statements for `rows`. Returns true when a bulk
    /// statement failed validation and per-row statements were written instead.
    fn render_rows(&self, table: &str, rows: &[RowData], sql: &mut String) -> bool {
        let adapter = self.adapter.as_ref();
        if self.strategy.inserts == InsertStyle::Bulk {
            if let Some(stmt) = bulk_insert(adapter, table, rows) {
                if validate_bulk_insert(&stmt, rows.len()) {
                    sql.push_str(&stmt);
                    return false;
                }
                warn!(table, rows = rows.len(), "Bulk insert failed validation, writing one statement per row");
                for row in rows {
                    sql.push_str(&insert_row(adapter, table, row));
                }
                return true;
            }
            return false;
        }
        for row in rows {
            sql.push_str(&insert_row(adapter, table, row));
        }
        false
    }
}

fn discovered_rows(cursor: &DumpCursor, table: &str) -> u64 {
    cursor
        .tables
        .as_ref()
        .and_then(|tables| tables.iter().find(|t| t.name == table))
        .map_or(0, |t| t.rows)
}

pub fn dump_header() -> String {
    let mut header = format!(
        "-- {GENERATOR_NAME} database dump\n-- generated {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    for statement in SESSION_PRELUDE {
        header.push_str(statement);
        header.push_str(";\n");
    }
    header.push('\n');
    header
}

pub fn dump_footer() -> String {
    "\nSET foreign_key_checks = 1;\n".to_string()
}
