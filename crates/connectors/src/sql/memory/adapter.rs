use crate::sql::base::{
    adapter::{DatabaseKind, SqlAdapter},
    error::DbError,
    metadata::TableStats,
    requests::FetchRowsRequest,
};
use async_trait::async_trait;
use model::records::row::RowData;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

const DEFAULT_VERSION: &str = "8.0.0-memory";

/// One in-process table: its DDL and rows in insertion order.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub name: String,
    pub create_statement: String,
    pub rows: Vec<RowData>,
}

impl MemoryTable {
    pub fn new(name: &str, create_statement: &str, rows: Vec<RowData>) -> Self {
        MemoryTable {
            name: name.to_string(),
            create_statement: create_statement.to_string(),
            rows,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    executed: Vec<String>,
    fail_on: Option<String>,
    fetches: usize,
}

/// SQL engine stand-in for dry runs and tests. Statements passed to `exec`
/// are recorded, not interpreted.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    state: Arc<Mutex<MemoryState>>,
    version: String,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        MemoryAdapter {
            state: Arc::new(Mutex::new(MemoryState::default())),
            version: DEFAULT_VERSION.to_string(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub async fn insert_table(&self, table: MemoryTable) {
        let mut state = self.state.lock().await;
        state.tables.insert(table.name.clone(), table);
    }

    pub async fn table(&self, name: &str) -> Option<MemoryTable> {
        self.state.lock().await.tables.get(name).cloned()
    }

    /// Every statement passed to `exec`, in order.
    pub async fn executed(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    /// Number of `fetch_rows` calls served so far.
    pub async fn fetch_count(&self) -> usize {
        self.state.lock().await.fetches
    }

    /// Makes `exec` and `fetch_rows` fail once they see `needle`.
    pub async fn fail_on(&self, needle: &str) {
        self.state.lock().await.fail_on = Some(needle.to_string());
    }

    fn check_failure(state: &MemoryState, subject: &str) -> Result<(), DbError> {
        match &state.fail_on {
            Some(needle) if subject.contains(needle.as_str()) => {
                Err(DbError::Exec(format!("injected failure on '{needle}'")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SqlAdapter for MemoryAdapter {
    async fn exec(&self, query: &str) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        Self::check_failure(&state, query)?;
        state.executed.push(query.to_string());
        Ok(())
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let mut state = self.state.lock().await;
        Self::check_failure(&state, &request.table)?;
        state.fetches += 1;

        let table = state
            .tables
            .get(&request.table)
            .ok_or_else(|| DbError::TableNotFound(request.table.clone()))?;

        let start = usize::try_from(request.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(request.limit).unwrap_or(usize::MAX);
        Ok(table.rows.iter().skip(start).take(limit).cloned().collect())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        Ok(self.state.lock().await.tables.keys().cloned().collect())
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats, DbError> {
        let state = self.state.lock().await;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;

        let rows = table.rows.len() as u64;
        let total: u64 = table.rows.iter().map(|r| r.size_bytes() as u64).sum();
        let avg_row_bytes = if rows == 0 { 0 } else { total / rows };
        Ok(TableStats {
            rows,
            avg_row_bytes,
        })
    }

    async fn create_table_statement(&self, table: &str) -> Result<String, DbError> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|t| t.create_statement.trim_end_matches(';').to_string())
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))
    }

    async fn server_version(&self) -> Result<String, DbError> {
        Ok(self.version.clone())
    }

    fn escape_string(&self, _value: &str) -> Option<String> {
        None
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Memory
    }
}
