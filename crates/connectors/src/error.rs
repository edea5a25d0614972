use crate::sql::base::error::{ConnectorError, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// An unsupported connection scheme was requested.
    #[error("Unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Failed to initialize a connector.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Database-related error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}
