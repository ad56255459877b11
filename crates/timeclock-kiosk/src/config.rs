//! Kiosk configuration and data-directory layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use timeclock_crypto::KdfParams;

/// Runtime configuration for one kiosk installation.
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Base URL of the timeclock server, e.g. `http://10.0.0.2:8080`.
    pub server_url: String,
    /// Code this kiosk is registered under on the server.
    pub kiosk_code: String,
    /// Directory holding queues, credentials, salt and cached settings.
    pub data_dir: PathBuf,
    /// Upper bound on every HTTP request.
    pub request_timeout: Duration,
    /// Cost of deriving the PIN key.
    pub kdf: KdfParams,
}

impl KioskConfig {
    pub fn new(server_url: impl Into<String>, kiosk_code: impl Into<String>, data_dir: PathBuf) -> Self {
        Self {
            server_url: server_url.into(),
            kiosk_code: kiosk_code.into(),
            data_dir,
            request_timeout: Duration::from_secs(10),
            kdf: KdfParams::default(),
        }
    }

    pub fn punch_queue_path(&self) -> PathBuf {
        self.data_dir.join("punch_queue.db")
    }

    pub fn photo_queue_path(&self) -> PathBuf {
        self.data_dir.join("photo_queue.db")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("device.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn salt_path(&self) -> PathBuf {
        self.data_dir.join("pin.salt")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Default data directory: `<local data dir>/timeclock`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("timeclock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_data_dir() {
        let config = KioskConfig::new("http://localhost:8080", "front-door", PathBuf::from("/var/kiosk"));
        assert_eq!(config.punch_queue_path(), PathBuf::from("/var/kiosk/punch_queue.db"));
        assert_eq!(config.photo_queue_path(), PathBuf::from("/var/kiosk/photo_queue.db"));
        assert_eq!(config.credentials_path(), PathBuf::from("/var/kiosk/device.json"));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}
