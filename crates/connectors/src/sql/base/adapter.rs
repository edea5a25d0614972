use crate::sql::base::{
    error::{BatchError, DbError},
    metadata::TableStats,
    requests::FetchRowsRequest,
};
use async_trait::async_trait;
use model::records::row::RowData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Memory,
    Other(String),
}

/// What the engine needs from a relational database. Connection setup lives
/// on the concrete adapters.
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    // Exec
    async fn exec(&self, query: &str) -> Result<(), DbError>;

    /// Runs `statements` in order on one connection, so session settings
    /// made by earlier statements hold for later ones.
    async fn exec_batch(&self, statements: &[String]) -> Result<(), BatchError> {
        for (executed, statement) in statements.iter().enumerate() {
            self.exec(statement)
                .await
                .map_err(|source| BatchError { executed, source })?;
        }
        Ok(())
    }

    // Reads
    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError>;

    // Introspection

    /// Base tables in a deterministic order.
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;
    async fn table_stats(&self, table: &str) -> Result<TableStats, DbError>;
    /// The `CREATE TABLE` statement for `table`, without a trailing `;`.
    async fn create_table_statement(&self, table: &str) -> Result<String, DbError>;
    async fn server_version(&self) -> Result<String, DbError>;

    /// Escapes string content with the engine's own facility (no surrounding
    /// quotes). `None` means the engine has none and callers fall back to
    /// their own escaping.
    fn escape_string(&self, value: &str) -> Option<String>;

    fn kind(&self) -> DatabaseKind;
}
