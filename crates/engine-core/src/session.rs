use crate::{
    error::StateStoreError,
    state::{
        SessionStore,
        models::{ExportCursors, ImportCursors, SessionKind},
    },
    workspace::new_run_id,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::steps::{ExportStep, ImportStep, StepSequence};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

/// Durable record of one run: where it is in its step sequence, whether it
/// has ended, and the cursors of the component currently working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState<S, C> {
    pub session_id: String,
    pub run_id: String,
    pub current_step: S,
    pub step_index: usize,
    pub total_steps: usize,
    pub progress_percent: f64,
    pub completed: bool,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: String,
    /// Steps that were passed over because the options disabled them.
    pub skipped_steps: Vec<S>,
    pub ticks: u64,
    pub cursors: C,
}

pub type ExportSession = SessionState<ExportStep, ExportCursors>;
pub type ImportSession = SessionState<ImportStep, ImportCursors>;

/// Binds a session type to its slot in the [`SessionStore`].
#[async_trait]
pub trait StoredSession: Sized + Send + Sync {
    const KIND: SessionKind;

    async fn load(store: &dyn SessionStore) -> Result<Option<Self>, StateStoreError>;
    async fn save(&self, store: &dyn SessionStore) -> Result<(), StateStoreError>;
}

#[async_trait]
impl StoredSession for ExportSession {
    const KIND: SessionKind = SessionKind::Export;

    async fn load(store: &dyn SessionStore) -> Result<Option<Self>, StateStoreError> {
        store.load_export().await
    }

    async fn save(&self, store: &dyn SessionStore) -> Result<(), StateStoreError> {
        store.save_export(self).await
    }
}

#[async_trait]
impl StoredSession for ImportSession {
    const KIND: SessionKind = SessionKind::Import;

    async fn load(store: &dyn SessionStore) -> Result<Option<Self>, StateStoreError> {
        store.load_import().await
    }

    async fn save(&self, store: &dyn SessionStore) -> Result<(), StateStoreError> {
        store.save_import(self).await
    }
}

impl<S: StepSequence, C> SessionState<S, C> {
    /// Fresh session on the first step with a new identity.
    pub fn new(cursors: C) -> Self {
        Self::with_run_id(new_run_id(Utc::now()), cursors)
    }

    /// A fresh session for a run whose id was allocated up front, so the
    /// cursors can already point into the run's directories.
    pub fn with_run_id(run_id: String, cursors: C) -> Self {
        let now = Utc::now();
        let first = S::first();
        SessionState {
            session_id: Uuid::new_v4().to_string(),
            run_id,
            current_step: first,
            step_index: 0,
            total_steps: S::total(),
            progress_percent: 0.0,
            completed: false,
            error: None,
            error_code: None,
            active: true,
            started_at: now,
            updated_at: now,
            message: first.description().to_string(),
            skipped_steps: Vec::new(),
            ticks: 0,
            cursors,
        }
    }

    /// Completed and failed sessions accept no further ticks.
    pub fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }

    fn apply_advance(&mut self) {
        if self.is_terminal() {
            return;
        }
        match self.current_step.next() {
            Some(next) => {
                self.current_step = next;
                self.step_index = next.index();
                let percent = self.step_index as f64 / self.total_steps as f64 * 100.0;
                self.progress_percent = self.progress_percent.max(percent);
                self.message = next.description().to_string();
            }
            None => {
                self.completed = true;
                self.active = false;
                self.progress_percent = 100.0;
            }
        }
    }

    fn apply_error(&mut self, message: &str, code: &str) {
        self.error = Some(message.to_string());
        self.error_code = Some(code.to_string());
        self.active = false;
        self.message = message.to_string();
    }
}

impl<S, C> SessionState<S, C>
where
    S: StepSequence,
    C: Send + Sync,
    Self: StoredSession,
{
    /// Builds a fresh session and persists it, replacing any earlier session
    /// of the same kind.
    pub async fn start(cursors: C, store: &dyn SessionStore) -> Result<Self, StateStoreError> {
        Self::start_run(new_run_id(Utc::now()), cursors, store).await
    }

    pub async fn start_run(
        run_id: String,
        cursors: C,
        store: &dyn SessionStore,
    ) -> Result<Self, StateStoreError> {
        let session = Self::with_run_id(run_id, cursors);
        session.save(store).await?;
        info!(
            kind = Self::KIND.as_str(),
            run_id = %session.run_id,
            "Session started"
        );
        Ok(session)
    }

    /// Moves to the next step, or completes the session on the last one.
    pub async fn advance_step(&mut self, store: &dyn SessionStore) -> Result<(), StateStoreError> {
        let from = self.current_step;
        self.apply_advance();
        info!(
            kind = Self::KIND.as_str(),
            run_id = %self.run_id,
            from = from.as_str(),
            to = self.current_step.as_str(),
            completed = self.completed,
            "Step advanced"
        );
        self.persist(store).await
    }

    /// Marks the current step as skipped and moves on.
    pub async fn skip_step(&mut self, store: &dyn SessionStore) -> Result<(), StateStoreError> {
        self.skipped_steps.push(self.current_step);
        self.advance_step(store).await
    }

    /// Records a terminal error. The session stays inspectable but inert.
    pub async fn record_error(
        &mut self,
        message: &str,
        code: &str,
        store: &dyn SessionStore,
    ) -> Result<(), StateStoreError> {
        error!(
            kind = Self::KIND.as_str(),
            run_id = %self.run_id,
            step = self.current_step.as_str(),
            code,
            "{message}"
        );
        self.apply_error(message, code);
        self.persist(store).await
    }

    /// Saves cursor changes made by the current step.
    pub async fn persist(&mut self, store: &dyn SessionStore) -> Result<(), StateStoreError> {
        self.updated_at = Utc::now();
        self.save(store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledSessionStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn walks_import_sequence_to_completion() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        let mut session = ImportSession::start(ImportCursors::default(), &store)
            .await
            .unwrap();

        let mut seen = vec![session.current_step];
        let mut last_percent = session.progress_percent;
        while !session.completed {
            session.advance_step(&store).await.unwrap();
            assert!(session.progress_percent >= last_percent);
            last_percent = session.progress_percent;
            if !session.completed {
                seen.push(session.current_step);
            }
        }

        assert_eq!(seen, ImportStep::SEQUENCE.to_vec());
        assert_eq!(session.progress_percent, 100.0);
        assert!(!session.active);

        let stored = store.load_import().await.unwrap().unwrap();
        assert!(stored.completed);
    }

    #[tokio::test]
    async fn progress_is_index_over_total() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        let mut session = ImportSession::start(ImportCursors::default(), &store)
            .await
            .unwrap();
        session.advance_step(&store).await.unwrap();
        session.advance_step(&store).await.unwrap();
        assert_eq!(session.current_step, ImportStep::ValidateManifest);
        assert_eq!(session.progress_percent, 25.0);
    }

    #[tokio::test]
    async fn error_is_terminal_and_persisted() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        let mut session = ImportSession::start(ImportCursors::default(), &store)
            .await
            .unwrap();

        session
            .record_error("archive is corrupt", "validation", &store)
            .await
            .unwrap();
        session.advance_step(&store).await.unwrap();

        assert_eq!(session.current_step, ImportStep::UploadFile);
        assert!(session.is_terminal());
        let stored = store.load_import().await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("archive is corrupt"));
        assert_eq!(stored.error_code.as_deref(), Some("validation"));
        assert!(!stored.active);
    }

    #[tokio::test]
    async fn start_replaces_previous_session() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        let first = ImportSession::start(ImportCursors::default(), &store)
            .await
            .unwrap();
        let second = ImportSession::start(ImportCursors::default(), &store)
            .await
            .unwrap();
        assert_ne!(first.session_id, second.session_id);
        let stored = store.load_import().await.unwrap().unwrap();
        assert_eq!(stored.session_id, second.session_id);
    }
}
