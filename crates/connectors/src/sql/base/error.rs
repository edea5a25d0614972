use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any MySQL driver error.
    #[error("SQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A statement was rejected by the engine.
    #[error("Statement failed: {0}")]
    Exec(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

/// A statement batch stopped part way. `executed` statements ran before
/// the failing one.
#[derive(Debug, Error)]
#[error("Statement {} of the batch failed: {source}", executed + 1)]
pub struct BatchError {
    pub executed: usize,
    #[source]
    pub source: DbError,
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),
}
