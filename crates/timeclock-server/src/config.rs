//! Server configuration: the kiosk registry and the manager PIN.
//!
//! ```toml
//! manager_pin = "2468"
//!
//! [[kiosks]]
//! kiosk_code = "front-door"
//! pairing_code = "PAIR-7731"
//! name = "Front door"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use timeclock_core::config::load_toml_file;
use timeclock_core::{Error, Result};
use timeclock_crypto::constant_time_str_eq;

/// One configured kiosk.
#[derive(Clone, Deserialize)]
pub struct KioskEntry {
    pub kiosk_code: String,
    pub pairing_code: String,
    #[serde(default)]
    pub name: String,
}

impl std::fmt::Debug for KioskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskEntry")
            .field("kiosk_code", &"[REDACTED]")
            .field("pairing_code", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

impl KioskEntry {
    /// Display name, falling back to the kiosk code.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.kiosk_code
        } else {
            &self.name
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    pub manager_pin: String,
    #[serde(default)]
    pub kiosks: Vec<KioskEntry>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("manager_pin", &"[REDACTED]")
            .field("kiosks", &self.kiosks)
            .finish()
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.manager_pin.is_empty() {
            return Err(Error::Config("manager_pin must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for kiosk in &self.kiosks {
            if kiosk.kiosk_code.is_empty() || kiosk.pairing_code.is_empty() {
                return Err(Error::Config(
                    "kiosk_code and pairing_code must not be empty".into(),
                ));
            }
            if !seen.insert(kiosk.kiosk_code.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate kiosk_code {}",
                    kiosk.kiosk_code
                )));
            }
        }
        Ok(())
    }
}

/// Lookup over the configured kiosks.
#[derive(Debug, Clone, Default)]
pub struct KioskRegistry {
    entries: Vec<KioskEntry>,
}

impl KioskRegistry {
    pub const fn new(entries: Vec<KioskEntry>) -> Self {
        Self { entries }
    }

    /// Find a kiosk by code. Every entry is compared so that timing does not
    /// reveal which configured code shares a prefix with the candidate.
    pub fn find(&self, kiosk_code: &str) -> Option<&KioskEntry> {
        let mut found = None;
        for entry in &self.entries {
            if constant_time_str_eq(&entry.kiosk_code, kiosk_code) && found.is_none() {
                found = Some(entry);
            }
        }
        found
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.kiosk_code.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
