use engine_config::error::ConfigError;
use engine_core::error::SplitError;
use engine_runtime::error::MigrationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Migration(#[from] MigrationError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("{kind} session failed: {message}")]
    SessionFailed { kind: String, message: String },

    #[error("Tick rejected: {0}")]
    TickRejected(String),

    #[error("Archive parts failed verification")]
    VerificationFailed,

    #[error("Shutdown requested")]
    ShutdownRequested,
}
