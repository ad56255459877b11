//! Process-wide tunables.
//!
//! Stored server-side as key/value rows and served to kiosks through
//! `/status`. Components never read a global: they receive a [`Tunables`]
//! snapshot at the start of each request or sync cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Snapshot of every admin-editable setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub pin_length: u32,
    pub min_seconds_between_punches: i64,
    pub max_shift_minutes: i64,
    pub sync_interval_secs: u64,
    pub sync_cooldown_secs: u64,
    pub sync_batch_size: u32,
    pub max_sync_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub photo_sync_interval_secs: u64,
    pub photo_max_bytes: u64,
    pub trust_device_time: bool,
    pub max_clock_skew_secs: i64,
    pub max_backdate_secs: i64,
    pub pair_lockout_attempts: u32,
    pub pair_lockout_window_secs: i64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            pin_length: 4,
            min_seconds_between_punches: 60,
            max_shift_minutes: 16 * 60,
            sync_interval_secs: 30,
            sync_cooldown_secs: 5,
            sync_batch_size: 20,
            max_sync_attempts: 10,
            backoff_base_secs: 5,
            backoff_cap_secs: 15 * 60,
            photo_sync_interval_secs: 60,
            photo_max_bytes: 5 * 1024 * 1024, // 5 MB
            trust_device_time: true,
            max_clock_skew_secs: 5 * 60,
            max_backdate_secs: 72 * 60 * 60,
            pair_lockout_attempts: 5,
            pair_lockout_window_secs: 15 * 60,
        }
    }
}

/// Error from assigning a single setting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for setting {key}")]
    InvalidValue { key: String, value: String },
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Like [`parse`], but zero is refused.
fn parse_positive<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = parse(key, value)?;
    if parsed == T::default() {
        return Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Tunables {
    /// Every recognised key, in display order.
    pub const KEYS: [&'static str; 16] = [
        "pin_length",
        "min_seconds_between_punches",
        "max_shift_minutes",
        "sync_interval_secs",
        "sync_cooldown_secs",
        "sync_batch_size",
        "max_sync_attempts",
        "backoff_base_secs",
        "backoff_cap_secs",
        "photo_sync_interval_secs",
        "photo_max_bytes",
        "trust_device_time",
        "max_clock_skew_secs",
        "max_backdate_secs",
        "pair_lockout_attempts",
        "pair_lockout_window_secs",
    ];

    /// Assign one setting from its stored string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "pin_length" => {
                let len: u32 = parse(key, value)?;
                if !(1..=12).contains(&len) {
                    return Err(SettingsError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.pin_length = len;
            }
            "min_seconds_between_punches" => self.min_seconds_between_punches = parse(key, value)?,
            "max_shift_minutes" => self.max_shift_minutes = parse(key, value)?,
            "sync_interval_secs" => self.sync_interval_secs = parse_positive(key, value)?,
            "sync_cooldown_secs" => self.sync_cooldown_secs = parse(key, value)?,
            "sync_batch_size" => self.sync_batch_size = parse_positive(key, value)?,
            "max_sync_attempts" => self.max_sync_attempts = parse_positive(key, value)?,
            "backoff_base_secs" => self.backoff_base_secs = parse(key, value)?,
            "backoff_cap_secs" => self.backoff_cap_secs = parse(key, value)?,
            "photo_sync_interval_secs" => self.photo_sync_interval_secs = parse_positive(key, value)?,
            "photo_max_bytes" => self.photo_max_bytes = parse(key, value)?,
            "trust_device_time" => self.trust_device_time = parse_bool(key, value)?,
            "max_clock_skew_secs" => self.max_clock_skew_secs = parse(key, value)?,
            "max_backdate_secs" => self.max_backdate_secs = parse(key, value)?,
            "pair_lockout_attempts" => self.pair_lockout_attempts = parse(key, value)?,
            "pair_lockout_window_secs" => self.pair_lockout_window_secs = parse(key, value)?,
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Build a snapshot from stored rows, falling back to defaults for keys
    /// that are absent or unparsable.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut tunables = Self::default();
        for (key, value) in pairs {
            if let Err(e) = tunables.set(key.as_ref(), value.as_ref()) {
                warn!(error = %e, "Ignoring stored setting");
            }
        }
        tunables
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn sync_cooldown(&self) -> Duration {
        Duration::from_secs(self.sync_cooldown_secs)
    }

    pub const fn photo_sync_interval(&self) -> Duration {
        Duration::from_secs(self.photo_sync_interval_secs)
    }

    /// Whether `pin` has the configured number of ASCII digits.
    pub fn is_valid_pin(&self, pin: &str) -> bool {
        pin.len() == self.pin_length as usize && pin.bytes().all(|b| b.is_ascii_digit())
    }
}
