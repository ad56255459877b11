//! Cached tunables.
//!
//! Settings rows are re-read on an interval. Request handlers take one
//! snapshot at the start of a request and use it throughout, so a refresh
//! never changes the rules halfway through a punch.

use std::sync::Arc;
use std::time::Duration;

use timeclock_core::Tunables;
use timeclock_core::db::DatabaseError;
use timeclock_core::settings::SettingsError;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::storage::ServerDatabase;

#[derive(Clone)]
pub struct SettingsCache {
    db: ServerDatabase,
    current: Arc<RwLock<Arc<Tunables>>>,
}

impl SettingsCache {
    /// Load the initial snapshot.
    pub async fn load(db: ServerDatabase) -> Result<Self, DatabaseError> {
        let tunables = read_tunables(&db).await?;
        Ok(Self {
            db,
            current: Arc::new(RwLock::new(Arc::new(tunables))),
        })
    }

    pub async fn snapshot(&self) -> Arc<Tunables> {
        Arc::clone(&*self.current.read().await)
    }

    /// Re-read settings from the database and swap the snapshot.
    pub async fn refresh(&self) -> Result<Arc<Tunables>, DatabaseError> {
        let tunables = Arc::new(read_tunables(&self.db).await?);
        *self.current.write().await = Arc::clone(&tunables);
        debug!("Settings refreshed");
        Ok(tunables)
    }

    /// Validate and store one setting, then refresh.
    pub async fn update(&self, key: &str, value: &str) -> Result<Arc<Tunables>, SettingsUpdateError> {
        let mut candidate = Tunables::default();
        candidate.set(key, value)?;
        self.db.set_setting(key, value.trim()).await?;
        Ok(self.refresh().await?)
    }

    /// Spawn the periodic refresh task.
    pub fn spawn_refresh(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = cache.refresh().await {
                            warn!(error = %e, "Settings refresh failed, keeping previous snapshot");
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Settings refresh task shutting down");
                        return;
                    }
                }
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsUpdateError {
    #[error(transparent)]
    Invalid(#[from] SettingsError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

async fn read_tunables(db: &ServerDatabase) -> Result<Tunables, DatabaseError> {
    Ok(Tunables::from_pairs(db.list_settings().await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_when_no_rows() {
        let db = ServerDatabase::open_in_memory().await.unwrap();
        let cache = SettingsCache::load(db).await.unwrap();
        assert_eq!(*cache.snapshot().await, Tunables::default());
    }

    #[tokio::test]
    async fn update_is_visible_in_next_snapshot() {
        let db = ServerDatabase::open_in_memory().await.unwrap();
        let cache = SettingsCache::load(db).await.unwrap();
        let before = cache.snapshot().await;

        cache.update("min_seconds_between_punches", "120").await.unwrap();

        assert_eq!(before.min_seconds_between_punches, 60);
        assert_eq!(cache.snapshot().await.min_seconds_between_punches, 120);
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_and_not_stored() {
        let db = ServerDatabase::open_in_memory().await.unwrap();
        let cache = SettingsCache::load(db.clone()).await.unwrap();

        assert!(matches!(
            cache.update("pin_length", "many").await,
            Err(SettingsUpdateError::Invalid(_))
        ));
        assert!(matches!(
            cache.update("no_such_key", "1").await,
            Err(SettingsUpdateError::Invalid(SettingsError::UnknownKey(_)))
        ));
        assert!(db.list_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_picks_up_external_writes() {
        let db = ServerDatabase::open_in_memory().await.unwrap();
        let cache = SettingsCache::load(db.clone()).await.unwrap();

        db.set_setting("trust_device_time", "false").await.unwrap();
        assert!(cache.snapshot().await.trust_device_time);
        cache.refresh().await.unwrap();
        assert!(!cache.snapshot().await.trust_device_time);
    }
}
