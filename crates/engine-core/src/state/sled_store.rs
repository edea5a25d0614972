use crate::{
    error::StateStoreError,
    session::{ExportSession, ImportSession},
    state::{
        SessionStore,
        models::{LockLease, SessionKind},
    },
};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::{path::Path, time::Duration};
use tracing::debug;

/// Attempts before a contended compare-and-swap gives up on the lock.
const LOCK_CAS_ATTEMPTS: usize = 3;

pub struct SledSessionStore {
    db: sled::Db,
}

impl SledSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateStoreError> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes and flushes; a crash after this returns cannot lose the record.
    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StateStoreError> {
        let bytes = bincode::serialize(value)?;
        self.db.insert(key, bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SledSessionStore {
    async fn load_export(&self) -> Result<Option<ExportSession>, StateStoreError> {
        self.load(&SessionKind::Export.session_key())
    }

    async fn save_export(&self, session: &ExportSession) -> Result<(), StateStoreError> {
        self.save(&SessionKind::Export.session_key(), session).await
    }

    async fn load_import(&self) -> Result<Option<ImportSession>, StateStoreError> {
        self.load(&SessionKind::Import.session_key())
    }

    async fn save_import(&self, session: &ImportSession) -> Result<(), StateStoreError> {
        self.save(&SessionKind::Import.session_key(), session).await
    }

    async fn try_lock(
        &self,
        kind: SessionKind,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StateStoreError> {
        let key = kind.lock_key();
        for _ in 0..LOCK_CAS_ATTEMPTS {
            let now = chrono::Utc::now().timestamp_millis();
            let current = self.db.get(&key)?;

            if let Some(bytes) = &current {
                let lease: LockLease = bincode::deserialize(bytes)?;
                if lease.holder != holder && lease.expires_at_ms > now {
                    debug!(kind = kind.as_str(), holder = %lease.holder, "Tick lock busy");
                    return Ok(false);
                }
            }

            let lease = LockLease {
                holder: holder.to_string(),
                expires_at_ms: now + ttl.as_millis() as i64,
            };
            let new = bincode::serialize(&lease)?;
            if self.db.compare_and_swap(&key, current, Some(new))?.is_ok() {
                self.db.flush_async().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn unlock(&self, kind: SessionKind, holder: &str) -> Result<(), StateStoreError> {
        let key = kind.lock_key();
        let Some(current) = self.db.get(&key)? else {
            return Ok(());
        };
        let lease: LockLease = bincode::deserialize(&current)?;
        if lease.holder == holder {
            // Losing this race only means someone else already took over.
            let _ = self
                .db
                .compare_and_swap(&key, Some(current), None::<Vec<u8>>)?;
            self.db.flush_async().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::state::models::ImportCursors;
    use model::steps::ImportStep;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_import_session() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        assert!(store.load_import().await.unwrap().is_none());

        let mut session: ImportSession = SessionState::new(ImportCursors::default());
        session.cursors.files_imported.push("uploads/a.png".into());
        store.save_import(&session).await.unwrap();

        let loaded = store.load_import().await.unwrap().unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.current_step, ImportStep::UploadFile);
        assert_eq!(loaded.cursors.files_imported, vec!["uploads/a.png"]);
        assert!(store.load_export().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_unlock() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();
        let ttl = Duration::from_secs(60);

        assert!(store.try_lock(SessionKind::Export, "a", ttl).await.unwrap());
        assert!(!store.try_lock(SessionKind::Export, "b", ttl).await.unwrap());
        // kinds are independent
        assert!(store.try_lock(SessionKind::Import, "b", ttl).await.unwrap());

        store.unlock(SessionKind::Export, "b").await.unwrap();
        assert!(!store.try_lock(SessionKind::Export, "b", ttl).await.unwrap());

        store.unlock(SessionKind::Export, "a").await.unwrap();
        assert!(store.try_lock(SessionKind::Export, "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let dir = tempdir().unwrap();
        let store = SledSessionStore::open(dir.path()).unwrap();

        assert!(
            store
                .try_lock(SessionKind::Import, "crashed", Duration::ZERO)
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(
            store
                .try_lock(SessionKind::Import, "next", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }
}
