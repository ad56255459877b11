//! Locally cached tunables.
//!
//! The server publishes its settings through `/status`; the kiosk keeps the
//! last copy in `settings.json` so that PIN validation and sync timing work
//! while offline. Each cycle takes one snapshot and uses it throughout.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use timeclock_core::Tunables;
use timeclock_core::config::{load_json_file, save_json_file};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct TunablesCache {
    path: PathBuf,
    current: RwLock<Arc<Tunables>>,
}

impl TunablesCache {
    /// Load the cached copy, falling back to defaults when absent or corrupt.
    pub fn load(path: PathBuf) -> Self {
        let tunables = match load_json_file::<Tunables>(&path) {
            Ok(Some(t)) => t,
            Ok(None) => Tunables::default(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Ignoring unreadable settings cache");
                Tunables::default()
            }
        };
        Self {
            path,
            current: RwLock::new(Arc::new(tunables)),
        }
    }

    pub fn snapshot(&self) -> Arc<Tunables> {
        match self.current.read() {
            Ok(t) => Arc::clone(&*t),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Swap in settings fetched from the server and persist them.
    pub fn replace(&self, tunables: Tunables) -> timeclock_core::Result<()> {
        if *self.snapshot() == tunables {
            return Ok(());
        }
        save_json_file(&self.path, &tunables, false)?;
        let next = Arc::new(tunables);
        match self.current.write() {
            Ok(mut current) => *current = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        debug!("Settings snapshot updated from server");
        Ok(())
    }
}
