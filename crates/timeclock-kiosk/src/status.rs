//! Status indicator shown on the kiosk screen.
//!
//! Background failures never interrupt the person at the kiosk; they only
//! change this indicator.

use serde::Serialize;
use tokio::sync::watch;

use crate::storage::QueueCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Online,
    Offline,
    Syncing,
    NeedsPairing,
}

impl ConnectionState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
            Self::Syncing => "Syncing",
            Self::NeedsPairing => "Needs pairing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KioskStatus {
    pub state: ConnectionState,
    pub punches: QueueCounts,
    pub photos: QueueCounts,
    /// Last message worth showing, e.g. why a queued punch was discarded.
    pub last_message: Option<String>,
}

impl Default for KioskStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Offline,
            punches: QueueCounts::default(),
            photos: QueueCounts::default(),
            last_message: None,
        }
    }
}

/// Shared, observable [`KioskStatus`].
#[derive(Debug)]
pub struct StatusIndicator {
    tx: watch::Sender<KioskStatus>,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(KioskStatus::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<KioskStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> KioskStatus {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.tx.send_if_modified(|s| {
            let changed = s.state != state;
            s.state = state;
            changed
        });
    }

    /// Leave `Syncing` for `Online`, unless the cycle ended in another state.
    pub fn finish_sync(&self) {
        self.tx.send_if_modified(|s| {
            if s.state == ConnectionState::Syncing {
                s.state = ConnectionState::Online;
                true
            } else {
                false
            }
        });
    }

    pub fn set_punch_counts(&self, counts: QueueCounts) {
        self.tx.send_if_modified(|s| {
            let changed = s.punches != counts;
            s.punches = counts;
            changed
        });
    }

    pub fn set_photo_counts(&self, counts: QueueCounts) {
        self.tx.send_if_modified(|s| {
            let changed = s.photos != counts;
            s.photos = counts;
            changed
        });
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| s.last_message = Some(message));
    }
}
