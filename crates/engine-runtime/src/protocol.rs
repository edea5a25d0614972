use engine_core::{
    session::{ExportSession, ImportSession, SessionState},
    state::models::SessionKind,
};
use model::steps::StepSequence;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickAction {
    #[default]
    Advance,
    Status,
}

/// One polling request. `options` is only read when `start` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRequest {
    #[serde(default = "default_kind")]
    pub kind: SessionKind,
    #[serde(default)]
    pub action: TickAction,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

fn default_kind() -> SessionKind {
    SessionKind::Export
}

impl TickRequest {
    pub fn advance(kind: SessionKind, session_token: Option<String>) -> Self {
        TickRequest {
            kind,
            action: TickAction::Advance,
            session_token,
            start: false,
            options: None,
        }
    }

    pub fn start(kind: SessionKind, options: Option<serde_json::Value>) -> Self {
        TickRequest {
            kind,
            action: TickAction::Advance,
            session_token: None,
            start: true,
            options,
        }
    }

    pub fn status(kind: SessionKind) -> Self {
        TickRequest {
            kind,
            action: TickAction::Status,
            session_token: None,
            start: false,
            options: None,
        }
    }
}

/// Per-component counters reported while a step is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_done: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_done: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_done: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_done: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements_executed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_rewritten: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub kind: SessionKind,
    pub session_token: Option<String>,
    pub run_id: Option<String>,
    pub step: Option<String>,
    pub step_index: usize,
    pub total_steps: usize,
    pub progress_percent: f64,
    pub completed: bool,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub active: bool,
    pub skipped_steps: Vec<String>,
    pub ticks: u64,
    pub progress: ComponentProgress,
}

impl StatusSnapshot {
    /// Status when no session of `kind` exists.
    pub fn idle(kind: SessionKind) -> Self {
        StatusSnapshot {
            kind,
            session_token: None,
            run_id: None,
            step: None,
            step_index: 0,
            total_steps: 0,
            progress_percent: 0.0,
            completed: false,
            error: None,
            error_code: None,
            active: false,
            skipped_steps: Vec::new(),
            ticks: 0,
            progress: ComponentProgress::default(),
        }
    }

    fn from_session<S: StepSequence, C>(
        kind: SessionKind,
        session: &SessionState<S, C>,
        progress: ComponentProgress,
    ) -> Self {
        StatusSnapshot {
            kind,
            session_token: Some(session.session_id.clone()),
            run_id: Some(session.run_id.clone()),
            step: Some(session.current_step.as_str().to_string()),
            step_index: session.step_index,
            total_steps: session.total_steps,
            progress_percent: session.progress_percent,
            completed: session.completed,
            error: session.error.clone(),
            error_code: session.error_code.clone(),
            active: session.active,
            skipped_steps: session
                .skipped_steps
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            ticks: session.ticks,
            progress,
        }
    }

    pub fn from_export(session: &ExportSession) -> Self {
        let c = &session.cursors;
        let mut progress = ComponentProgress::default();
        if let Some(files) = &c.files {
            let estimate = c
                .archive
                .runtime
                .estimate(files.len().saturating_sub(c.archive.current_index), files.remaining_bytes(c.archive.current_index));
            progress.files_total = Some(files.len());
            progress.files_done = Some(c.archive.current_index);
            progress.bytes_total = Some(files.total_bytes());
            progress.bytes_done = Some(c.archive.bytes_added);
            progress.last_batch_size = Some(c.archive.last_batch_size);
            progress.eta_secs = estimate.eta_secs;
        }
        if c.dump.is_started() {
            progress.tables_total = Some(c.dump.total_tables());
            progress.tables_done = Some(c.dump.completed_tables.len());
            progress.rows_total = Some(c.dump.total_rows());
            progress.rows_done = Some(c.dump.rows_written);
        }
        progress.artifacts = c
            .artifacts
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Self::from_session(SessionKind::Export, session, progress)
    }

    pub fn from_import(session: &ImportSession) -> Self {
        let c = &session.cursors;
        let mut progress = ComponentProgress::default();
        if let Some(files) = &c.files {
            progress.files_total = Some(files.len());
            progress.files_done = Some(c.file_index);
            progress.bytes_total = Some(files.total_bytes());
        }
        if c.statements_executed > 0 || c.sql_done {
            progress.statements_executed = Some(c.statements_executed);
        }
        if c.rows_rewritten > 0 {
            progress.rows_rewritten = Some(c.rows_rewritten);
        }
        if let Some(backup) = &c.backup_path {
            progress.artifacts.push(backup.display().to_string());
        }
        Self::from_session(SessionKind::Import, session, progress)
    }

    pub fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResponse {
    pub success: bool,
    pub message: String,
    pub status: StatusSnapshot,
}

impl TickResponse {
    pub fn ok(message: impl Into<String>, status: StatusSnapshot) -> Self {
        TickResponse {
            success: true,
            message: message.into(),
            status,
        }
    }

    pub fn failed(message: impl Into<String>, status: StatusSnapshot) -> Self {
        TickResponse {
            success: false,
            message: message.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_export_advance() {
        let req: TickRequest = serde_json::from_str(r#"{"session_token":"abc"}"#).unwrap();
        assert_eq!(req.kind, SessionKind::Export);
        assert_eq!(req.action, TickAction::Advance);
        assert!(!req.start);
        assert_eq!(req.session_token.as_deref(), Some("abc"));
    }

    #[test]
    fn parses_start_with_options() {
        let req: TickRequest = serde_json::from_str(
            r#"{"kind":"import","action":"advance","start":true,"options":{"archive":["a.zip"]}}"#,
        )
        .unwrap();
        assert_eq!(req.kind, SessionKind::Import);
        assert!(req.start);
        assert!(req.options.is_some());
    }

    #[test]
    fn idle_status_omits_empty_progress() {
        let json = serde_json::to_value(StatusSnapshot::idle(SessionKind::Export)).unwrap();
        assert_eq!(json["progress"], serde_json::json!({}));
        assert_eq!(json["kind"], "export");
    }
}
