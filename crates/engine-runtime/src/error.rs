use connectors::{
    archive::error::ArchiveError, error::AdapterError, sql::base::error::DbError,
};
use engine_config::error::ConfigError;
use engine_core::error::{SplitError, StateStoreError};
use engine_processing::error::ProcessingError;
use model::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Discriminated reason for a failed tick, persisted next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Precondition,
    Session,
    StepExecution,
    Validation,
    Storage,
    Busy,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Precondition => "precondition",
            ErrorCode::Session => "session",
            ErrorCode::StepExecution => "step_execution",
            ErrorCode::Validation => "validation",
            ErrorCode::Storage => "storage",
            ErrorCode::Busy => "busy",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error of the export and import controllers.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Checked before a session is created; nothing was persisted.
    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Session(String),

    #[error("Another tick is already running for the {0} session")]
    Busy(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Manifest(#[from] ManifestError),

    #[error("Session store error: {0}")]
    Storage(#[from] StateStoreError),

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MigrationError::Precondition(_)
            | MigrationError::Adapter(_)
            | MigrationError::Config(_) => ErrorCode::Precondition,
            MigrationError::Session(_) => ErrorCode::Session,
            MigrationError::Busy(_) => ErrorCode::Busy,
            MigrationError::Validation(_) | MigrationError::Manifest(_) => ErrorCode::Validation,
            MigrationError::Storage(_) => ErrorCode::Storage,
            MigrationError::Processing(_)
            | MigrationError::Archive(_)
            | MigrationError::Split(_)
            | MigrationError::Database(_)
            | MigrationError::Io(_) => ErrorCode::StepExecution,
        }
    }
}
