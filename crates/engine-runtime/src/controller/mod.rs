use crate::{
    error::MigrationError,
    protocol::{TickRequest, TickResponse},
};
use async_trait::async_trait;
use engine_core::{
    session::{SessionState, StoredSession},
    state::{SessionStore, models::SessionKind},
};
use model::steps::StepSequence;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub mod export;
pub mod import;
#[cfg(test)]
pub(crate) mod testing;

pub use export::ExportController;
pub use import::ImportController;

/// Answers polling requests for one session kind. Failures are folded into
/// the response, never returned.
#[async_trait]
pub trait TickHandler: Send {
    fn kind(&self) -> SessionKind;

    async fn handle(&mut self, request: TickRequest) -> TickResponse;
}

/// What the current step did during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// Step finished; advance to the next one.
    Done(String),
    /// Bounded unit done, more work remains in this step.
    Pending(String),
    /// Step disabled or not applicable; advance without work.
    Skipped(String),
}

pub(crate) fn lock_holder(kind: SessionKind) -> String {
    format!(
        "{}-{}-{}",
        kind.as_str(),
        std::process::id(),
        Uuid::new_v4().simple()
    )
}

pub(crate) async fn acquire_lock(
    store: &dyn SessionStore,
    kind: SessionKind,
    holder: &str,
    ttl: Duration,
) -> Result<(), MigrationError> {
    if store.try_lock(kind, holder, ttl).await? {
        Ok(())
    } else {
        Err(MigrationError::Busy(kind.as_str().to_string()))
    }
}

pub(crate) async fn release_lock(store: &dyn SessionStore, kind: SessionKind, holder: &str) {
    if let Err(e) = store.unlock(kind, holder).await {
        warn!(kind = kind.as_str(), error = %e, "Failed to release tick lock");
    }
}

/// Rejects a tick that names a different session than the stored one.
pub(crate) fn check_token(given: Option<&str>, session_id: &str) -> Result<(), MigrationError> {
    match given {
        Some(token) if token != session_id => Err(MigrationError::Session(
            "Session token does not match the active session".into(),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn parse_options<T: DeserializeOwned + Default>(
    options: Option<serde_json::Value>,
) -> Result<T, MigrationError> {
    match options {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| MigrationError::Precondition(format!("Invalid options: {e}"))),
    }
}

/// Persists the effect of one step execution on the session.
pub(crate) async fn apply_outcome<S, C>(
    session: &mut SessionState<S, C>,
    outcome: Result<StepOutcome, MigrationError>,
    store: &dyn SessionStore,
) -> Result<(), MigrationError>
where
    S: StepSequence,
    C: Send + Sync,
    SessionState<S, C>: StoredSession,
{
    let step = session.current_step.as_str();
    match outcome {
        Ok(StepOutcome::Done(message)) => {
            info!(run_id = %session.run_id, step, "{message}");
            session.message = message;
            session.advance_step(store).await?;
        }
        Ok(StepOutcome::Pending(message)) => {
            session.message = message;
            session.persist(store).await?;
        }
        Ok(StepOutcome::Skipped(reason)) => {
            info!(run_id = %session.run_id, step, reason = %reason, "Step skipped");
            session.skip_step(store).await?;
        }
        Err(e) => {
            session
                .record_error(&e.to_string(), e.code().as_str(), store)
                .await?;
        }
    }
    Ok(())
}

/// Response for a session after a tick: its error if it has one, otherwise
/// its current message.
pub(crate) fn session_response<S, C>(
    session: &SessionState<S, C>,
    status: crate::protocol::StatusSnapshot,
) -> TickResponse {
    match &session.error {
        Some(error) => TickResponse::failed(error.clone(), status),
        None => TickResponse::ok(session.message.clone(), status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::options::ImportOptions;

    #[test]
    fn token_must_match_when_given() {
        assert!(check_token(None, "abc").is_ok());
        assert!(check_token(Some("abc"), "abc").is_ok());
        let err = check_token(Some("xyz"), "abc").unwrap_err();
        assert_eq!(err.code().as_str(), "session");
    }

    #[test]
    fn missing_options_take_defaults() {
        let opts: ImportOptions = parse_options(None).unwrap();
        assert_eq!(opts, ImportOptions::default());

        let err = parse_options::<ImportOptions>(Some(serde_json::json!({"archive": 5})))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "precondition");
    }

    #[test]
    fn holders_are_unique() {
        assert_ne!(lock_holder(SessionKind::Export), lock_holder(SessionKind::Export));
    }
}
