use crate::error::MigrationError;
use connectors::{adapter::Adapter, sql::base::adapter::SqlAdapter};
use engine_config::settings::Settings;
use engine_core::{
    split::ArchiveSplitter,
    state::{SessionStore, sled_store::SledSessionStore},
};
use std::sync::Arc;
use tracing::info;

/// Everything a controller needs besides the session itself.
#[derive(Clone)]
pub struct RuntimeContext {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn SessionStore>,
    pub adapter: Arc<dyn SqlAdapter>,
}

impl RuntimeContext {
    pub fn new(settings: Settings, store: Arc<dyn SessionStore>, adapter: Arc<dyn SqlAdapter>) -> Self {
        RuntimeContext {
            settings: Arc::new(settings),
            store,
            adapter,
        }
    }

    /// Opens the session store under `paths.state_dir` and connects to
    /// `database.url`.
    pub async fn connect(settings: Settings) -> Result<Self, MigrationError> {
        let store = SledSessionStore::open(&settings.paths.state_dir)?;
        let adapter = Adapter::connect(&settings.database.url).await?;
        info!(
            state_dir = %settings.paths.state_dir.display(),
            database = ?adapter.get_sql().kind(),
            "Runtime context ready"
        );
        Ok(Self::new(settings, Arc::new(store), adapter.into_shared()))
    }

    pub fn splitter(&self) -> ArchiveSplitter {
        ArchiveSplitter::new(self.settings.archive.split_io_chunk())
    }
}
