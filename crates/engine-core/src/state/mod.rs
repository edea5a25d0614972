use crate::{
    error::StateStoreError,
    session::{ExportSession, ImportSession},
    state::models::SessionKind,
};
use async_trait::async_trait;
use std::time::Duration;

pub mod models;
pub mod sled_store;

/// Durable home of the single export session and the single import session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_export(&self) -> Result<Option<ExportSession>, StateStoreError>;
    async fn save_export(&self, session: &ExportSession) -> Result<(), StateStoreError>;

    async fn load_import(&self) -> Result<Option<ImportSession>, StateStoreError>;
    async fn save_import(&self, session: &ImportSession) -> Result<(), StateStoreError>;

    /// Takes the tick lock for `kind`. Returns `false` while another holder's
    /// lease is still valid.
    async fn try_lock(
        &self,
        kind: SessionKind,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError>;
    async fn unlock(&self, kind: SessionKind, holder: &str) -> Result<(), StateStoreError>;
}
