//! Background delivery of queued punches and photos.
//!
//! Each cycle probes the server, refreshes the cached settings, loads the
//! device credentials and then drains a batch of due items, oldest first.
//! Every response is classified into a [`Delivery`] that decides what
//! happens to the item.

mod photo;
mod punch;


use std::sync::{Arc, Mutex};
use std::time::Duration;

use timeclock_core::wire::{PhotoUploadResponse, PunchResponse, PunchStatus};
use timeclock_core::{ErrorCategory, ErrorCode, Tunables};
use tokio::time::Instant;
use tracing::{debug, warn};

pub use photo::PhotoSync;
pub use punch::PunchSync;

use crate::client::{ClientError, KioskApi};
use crate::connectivity::ConnectivityMonitor;
use crate::credentials::{CredentialStore, DeviceCredentials};
use crate::error::KioskError;
use crate::settings::TunablesCache;
use crate::status::{ConnectionState, StatusIndicator};
use crate::vault::PinVault;

/// How one delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Recorded by the server, or already recorded earlier.
    Accepted { message: Option<String> },
    /// Settled with a business or validation error. Never retried.
    Terminal(ErrorCode),
    /// The device lost its authority. The item stays queued until re-pair.
    Unauthorized(ErrorCode),
    /// Try again later.
    Retryable { reason: String, offline: bool },
}

impl Delivery {
    fn from_code(code: ErrorCode) -> Self {
        match code.category() {
            ErrorCategory::Authorization => Self::Unauthorized(code),
            ErrorCategory::Transient => Self::Retryable {
                reason: code.as_str().to_string(),
                offline: false,
            },
            ErrorCategory::Domain | ErrorCategory::Validation | ErrorCategory::Local => {
                Self::Terminal(code)
            }
        }
    }

    fn from_error(error: &ClientError) -> Self {
        match error.code() {
            Some(code) => Self::from_code(code),
            None => Self::Retryable {
                reason: error.to_string(),
                offline: error.is_offline(),
            },
        }
    }

    pub fn from_punch(result: &Result<PunchResponse, ClientError>) -> Self {
        match result {
            Ok(resp) => match (resp.status, resp.error) {
                (PunchStatus::Duplicate, _) => Self::Accepted { message: None },
                (_, Some(code)) => Self::from_code(code),
                (PunchStatus::Processed, None) => Self::Accepted {
                    message: resp.message.clone(),
                },
                (PunchStatus::Error, None) => Self::Retryable {
                    reason: "error status without a code".to_string(),
                    offline: false,
                },
            },
            Err(e) => Self::from_error(e),
        }
    }

    pub fn from_photo(result: &Result<PhotoUploadResponse, ClientError>) -> Self {
        match result {
            Ok(_) => Self::Accepted { message: None },
            Err(e) => Self::from_error(e),
        }
    }

    /// Whether the server answered at all.
    pub const fn reached_server(&self) -> bool {
        !matches!(self, Self::Retryable { offline: true, .. })
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Skipped because the previous cycle ran too recently.
    pub skipped: bool,
    /// The server could not be reached.
    pub offline: bool,
    /// Stopped because the device has no usable pairing.
    pub stalled: bool,
    pub attempted: u32,
    pub delivered: u32,
    pub discarded: u32,
    pub retried: u32,
    pub dead: u32,
}

/// Rate limit between cycles.
#[derive(Debug, Default)]
pub(crate) struct Cooldown {
    last: Mutex<Option<Instant>>,
}

impl Cooldown {
    /// Returns `true` and records the start if at least `cooldown` has
    /// passed since the last accepted start.
    pub(crate) fn try_begin(&self, cooldown: Duration) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < cooldown) {
            return false;
        }
        *last = Some(now);
        true
    }
}

pub(crate) enum Readiness {
    Offline,
    Unpaired,
    Ready {
        tunables: Arc<Tunables>,
        credentials: DeviceCredentials,
    },
}

/// State shared by the kiosk facade and both sync engines.
#[derive(Debug)]
pub struct SyncContext<A> {
    pub api: A,
    pub kiosk_code: String,
    pub credentials: CredentialStore,
    pub vault: PinVault,
    pub settings: TunablesCache,
    pub status: StatusIndicator,
    pub connectivity: ConnectivityMonitor,
}

impl<A: KioskApi> SyncContext<A> {
    /// Stored credentials, unless absent or flagged revoked.
    pub fn usable_credentials(&self) -> Result<Option<DeviceCredentials>, KioskError> {
        Ok(self.credentials.load()?.filter(DeviceCredentials::is_usable))
    }

    /// Probe the server and refresh settings before a cycle.
    pub(crate) async fn prepare(&self) -> Result<Readiness, KioskError> {
        let credentials = self.usable_credentials()?;

        if let Err(e) = self.api.ping().await {
            debug!(error = %e, "Ping failed");
            self.connectivity.report(false);
            self.status.set_state(if credentials.is_some() {
                ConnectionState::Offline
            } else {
                ConnectionState::NeedsPairing
            });
            return Ok(Readiness::Offline);
        }
        self.connectivity.report(true);

        match self.api.status(&self.kiosk_code).await {
            Ok(status) => {
                if let Err(e) = self.settings.replace(status.settings) {
                    warn!(error = %e, "Failed to cache settings");
                }
            }
            Err(e) => warn!(error = %e, "Failed to refresh settings"),
        }

        let Some(credentials) = credentials else {
            self.status.set_state(ConnectionState::NeedsPairing);
            return Ok(Readiness::Unpaired);
        };
        self.status.set_state(ConnectionState::Syncing);
        Ok(Readiness::Ready {
            tunables: self.settings.snapshot(),
            credentials,
        })
    }

    /// React to an authorization failure seen while using `used`.
    pub(crate) fn revoke_locally(&self, used: &DeviceCredentials, code: ErrorCode) -> Result<(), KioskError> {
        if self.credentials.mark_revoked(used)? {
            warn!(code = code.as_str(), "Server refused device credentials");
            self.status.set_state(ConnectionState::NeedsPairing);
            self.status.set_message(code.user_message());
        }
        Ok(())
    }

    /// Update reachability after a delivery attempt.
    pub(crate) fn observe(&self, delivery: &Delivery) {
        let reached = delivery.reached_server();
        self.connectivity.report(reached);
        match (reached, self.status.state()) {
            (false, ConnectionState::Online | ConnectionState::Syncing) => {
                self.status.set_state(ConnectionState::Offline);
            }
            (true, ConnectionState::Offline) => self.status.set_state(ConnectionState::Online),
            _ => {}
        }
    }
}
