//! The kiosk as seen by its front end.
//!
//! Every punch is written to the local queue before anything goes over the
//! network, then tried once right away. Whatever does not get through is
//! left to the background sync tasks started with [`Kiosk::start`].

use std::sync::Arc;

use timeclock_core::db::unix_timestamp;
use timeclock_core::wire::PunchRequest;
use timeclock_core::{ErrorCode, PunchAction, Tunables};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, DeviceAuth, KioskApi};
use crate::config::KioskConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::credentials::{CredentialStore, DeviceCredentials};
use crate::error::KioskError;
use crate::scheduler::{Ticket, schedule_every};
use crate::settings::TunablesCache;
use crate::status::{ConnectionState, KioskStatus, StatusIndicator};
use crate::storage::{NewQueuedPhoto, NewQueuedPunch, PhotoQueueDb, PunchQueueDb};
use crate::sync::{CycleReport, Delivery, PhotoSync, PunchSync, SyncContext};
use crate::vault::PinVault;

const RECORDED: &str = "Punch recorded.";
const SAVED_OFFLINE: &str = "Punch saved. It will be sent when the server is reachable.";

/// What happened to a punch or photo at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server recorded it.
    Accepted,
    /// Saved locally; the sync tasks will deliver it.
    Queued,
    /// Refused. Nothing further will happen with it.
    Rejected(ErrorCode),
}

/// Shown to the employee after a punch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchReceipt {
    pub event_uuid: String,
    pub action: PunchAction,
    pub device_time: i64,
    pub outcome: SubmitOutcome,
    pub message: String,
}

/// Result of [`Kiosk::sync_now`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub punches: CycleReport,
    pub photos: CycleReport,
}

pub struct Kiosk<A: KioskApi = ApiClient> {
    ctx: Arc<SyncContext<A>>,
    punches: Arc<PunchSync<A>>,
    photos: Arc<PhotoSync<A>>,
}

impl Kiosk<ApiClient> {
    /// Open the kiosk's local stores and an HTTP client for `config`.
    pub async fn open(config: &KioskConfig) -> Result<Self, KioskError> {
        let api = ApiClient::new(&config.server_url, config.request_timeout)?;
        Self::with_api(config, api).await
    }
}

impl<A: KioskApi> Kiosk<A> {
    pub async fn with_api(config: &KioskConfig, api: A) -> Result<Self, KioskError> {
        tokio::fs::create_dir_all(config.data_dir())
            .await
            .map_err(timeclock_core::Error::from)?;

        let punch_queue = PunchQueueDb::open(&config.punch_queue_path()).await?;
        let photo_queue = PhotoQueueDb::open(&config.photo_queue_path()).await?;
        let vault = PinVault::open(&config.salt_path(), config.kdf)?;

        let ctx = Arc::new(SyncContext {
            api,
            kiosk_code: config.kiosk_code.clone(),
            credentials: CredentialStore::new(config.credentials_path()),
            vault,
            settings: TunablesCache::load(config.settings_path()),
            status: StatusIndicator::new(),
            connectivity: ConnectivityMonitor::new(),
        });
        let kiosk = Self {
            punches: Arc::new(PunchSync::new(Arc::clone(&ctx), punch_queue)),
            photos: Arc::new(PhotoSync::new(Arc::clone(&ctx), photo_queue)),
            ctx,
        };

        if kiosk.ctx.usable_credentials()?.is_none() {
            kiosk.ctx.status.set_state(ConnectionState::NeedsPairing);
        }
        kiosk.punches.refresh_counts().await?;
        kiosk.photos.refresh_counts().await?;
        info!(kiosk = %config.kiosk_code, data_dir = %config.data_dir().display(), "Kiosk opened");
        Ok(kiosk)
    }

    pub fn kiosk_code(&self) -> &str {
        &self.ctx.kiosk_code
    }

    pub fn api(&self) -> &A {
        &self.ctx.api
    }

    pub fn status(&self) -> KioskStatus {
        self.ctx.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<KioskStatus> {
        self.ctx.status.subscribe()
    }

    pub fn settings(&self) -> Arc<Tunables> {
        self.ctx.settings.snapshot()
    }

    pub fn credentials(&self) -> Result<Option<DeviceCredentials>, KioskError> {
        Ok(self.ctx.credentials.load()?)
    }

    pub fn punch_queue(&self) -> &PunchQueueDb {
        self.punches.queue()
    }

    pub fn photo_queue(&self) -> &PhotoQueueDb {
        self.photos.queue()
    }

    /// Pair with the server using the kiosk's pairing code. Returns the new
    /// pairing version.
    pub async fn pair(&self, pairing_code: &str) -> Result<i64, KioskError> {
        let resp = self.ctx.api.pair(&self.ctx.kiosk_code, pairing_code).await?;
        let credentials = DeviceCredentials::new(&self.ctx.kiosk_code, resp.device_token, resp.pairing_version);
        self.ctx.credentials.save(&credentials)?;

        self.ctx.connectivity.report(true);
        self.ctx.status.set_state(ConnectionState::Online);
        self.ctx.status.set_message("Kiosk paired.");
        info!(kiosk = %self.ctx.kiosk_code, pairing_version = resp.pairing_version, "Kiosk paired");
        Ok(resp.pairing_version)
    }

    /// Revoke this kiosk's pairing on the server with the manager PIN.
    pub async fn revoke(&self, manager_pin: &str) -> Result<i64, KioskError> {
        let resp = self.ctx.api.revoke(&self.ctx.kiosk_code, manager_pin).await?;
        if let Some(credentials) = self.ctx.credentials.load()? {
            self.ctx.credentials.mark_revoked(&credentials)?;
        }
        self.ctx.status.set_state(ConnectionState::NeedsPairing);
        self.ctx.status.set_message(ErrorCode::DeviceRevoked.user_message());
        info!(kiosk = %self.ctx.kiosk_code, pairing_version = resp.pairing_version, "Kiosk revoked");
        Ok(resp.pairing_version)
    }

    /// Record a punch entered at the kiosk.
    ///
    /// A paired kiosk queues the punch first and never loses it to a network
    /// failure. A kiosk without credentials can only punch while the server
    /// is reachable.
    pub async fn punch(&self, action: PunchAction, pin: &str) -> Result<PunchReceipt, KioskError> {
        if !self.ctx.settings.snapshot().is_valid_pin(pin) {
            return Err(KioskError::Rejected(ErrorCode::InvalidPinFormat));
        }

        let event_uuid = uuid::Uuid::new_v4().to_string();
        let device_time = unix_timestamp();
        let (outcome, message) = match self.ctx.credentials.load()? {
            Some(credentials) if !credentials.is_usable() => return Err(KioskError::NeedsPairing),
            Some(credentials) => {
                self.queue_and_send(&event_uuid, action, device_time, pin, &credentials)
                    .await?
            }
            None => self.submit_unpaired(&event_uuid, action, device_time, pin).await?,
        };

        info!(%event_uuid, action = action.as_str(), outcome = ?outcome, "Punch entered");
        Ok(PunchReceipt {
            event_uuid,
            action,
            device_time,
            outcome,
            message,
        })
    }

    async fn queue_and_send(
        &self,
        event_uuid: &str,
        action: PunchAction,
        device_time: i64,
        pin: &str,
        credentials: &DeviceCredentials,
    ) -> Result<(SubmitOutcome, String), KioskError> {
        let sealed = self.ctx.vault.seal(credentials, pin).await?;
        self.punches
            .queue()
            .enqueue(
                &NewQueuedPunch {
                    event_uuid,
                    action,
                    pin_ciphertext: &sealed,
                    device_time,
                },
                device_time,
            )
            .await?;
        debug!(%event_uuid, "Punch queued");

        let delivery = match self.punches.deliver_now(event_uuid, credentials).await {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(%event_uuid, error = %e, "Immediate delivery failed, left queued");
                return Ok((SubmitOutcome::Queued, SAVED_OFFLINE.to_string()));
            }
        };
        Ok(match delivery {
            Delivery::Accepted { message } => (
                SubmitOutcome::Accepted,
                message.unwrap_or_else(|| RECORDED.to_string()),
            ),
            Delivery::Terminal(code) => (SubmitOutcome::Rejected(code), code.user_message().to_string()),
            Delivery::Unauthorized(code) => (SubmitOutcome::Queued, code.user_message().to_string()),
            Delivery::Retryable { .. } => (SubmitOutcome::Queued, SAVED_OFFLINE.to_string()),
        })
    }

    /// Without a token there is nothing to seal the PIN with, so the punch
    /// goes straight to the server or is refused.
    async fn submit_unpaired(
        &self,
        event_uuid: &str,
        action: PunchAction,
        device_time: i64,
        pin: &str,
    ) -> Result<(SubmitOutcome, String), KioskError> {
        let request = PunchRequest {
            event_uuid: Some(event_uuid.to_string()),
            action: Some(action.as_str().to_string()),
            pin: Some(pin.to_string()),
            device_time: Some(device_time),
        };
        let result = self
            .ctx
            .api
            .punch(&DeviceAuth::unpaired(&self.ctx.kiosk_code), &request)
            .await;
        let delivery = Delivery::from_punch(&result);
        self.ctx.observe(&delivery);

        Ok(match delivery {
            Delivery::Retryable { offline: true, .. } => return Err(KioskError::OfflineUnpaired),
            Delivery::Accepted { message } => (
                SubmitOutcome::Accepted,
                message.unwrap_or_else(|| RECORDED.to_string()),
            ),
            Delivery::Terminal(code) => (SubmitOutcome::Rejected(code), code.user_message().to_string()),
            Delivery::Unauthorized(code) => {
                self.ctx.status.set_state(ConnectionState::NeedsPairing);
                (SubmitOutcome::Rejected(code), code.user_message().to_string())
            }
            Delivery::Retryable { .. } => (
                SubmitOutcome::Rejected(ErrorCode::ServerError),
                ErrorCode::ServerError.user_message().to_string(),
            ),
        })
    }

    /// Queue evidence for a punch and try to send it right away.
    pub async fn capture_photo(
        &self,
        event_uuid: &str,
        action: PunchAction,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<SubmitOutcome, KioskError> {
        if bytes.is_empty() {
            return Err(KioskError::Rejected(ErrorCode::MissingFile));
        }
        if bytes.len() as u64 > self.ctx.settings.snapshot().photo_max_bytes {
            return Err(KioskError::Rejected(ErrorCode::FileTooLarge));
        }

        self.photos
            .queue()
            .enqueue(
                &NewQueuedPhoto {
                    event_uuid,
                    action,
                    device_time: unix_timestamp(),
                    content_type,
                    photo: bytes,
                },
                unix_timestamp(),
            )
            .await?;
        debug!(%event_uuid, bytes = bytes.len(), "Photo queued");

        let Some(credentials) = self.ctx.usable_credentials()? else {
            self.photos.refresh_counts().await?;
            return Ok(SubmitOutcome::Queued);
        };
        match self.photos.deliver_now(event_uuid, &credentials).await {
            Ok(Delivery::Accepted { .. }) => Ok(SubmitOutcome::Accepted),
            Ok(Delivery::Terminal(code)) => Ok(SubmitOutcome::Rejected(code)),
            Ok(Delivery::Unauthorized(_) | Delivery::Retryable { .. }) => Ok(SubmitOutcome::Queued),
            Err(e) => {
                warn!(%event_uuid, error = %e, "Immediate photo delivery failed, left queued");
                Ok(SubmitOutcome::Queued)
            }
        }
    }

    /// Drain both queues now, ignoring the cooldown.
    pub async fn sync_now(&self) -> Result<SyncSummary, KioskError> {
        Ok(SyncSummary {
            punches: self.punches.drain().await?,
            photos: self.photos.drain().await?,
        })
    }

    /// Start the punch and photo sync tasks and the reconnect watcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> KioskTasks {
        let punch = {
            let ctx = Arc::clone(&self.ctx);
            let sync = Arc::clone(&self.punches);
            schedule_every(
                "punch-sync",
                move || ctx.settings.snapshot().sync_interval(),
                move || {
                    let sync = Arc::clone(&sync);
                    async move {
                        if let Err(e) = sync.run_cycle().await {
                            warn!(error = %e, "Punch sync cycle failed");
                        }
                    }
                },
            )
        };
        let photo = {
            let ctx = Arc::clone(&self.ctx);
            let sync = Arc::clone(&self.photos);
            schedule_every(
                "photo-sync",
                move || ctx.settings.snapshot().photo_sync_interval(),
                move || {
                    let sync = Arc::clone(&sync);
                    async move {
                        if let Err(e) = sync.run_cycle().await {
                            warn!(error = %e, "Photo sync cycle failed");
                        }
                    }
                },
            )
        };

        let (stop, mut stopped) = watch::channel(false);
        let mut watcher = self.ctx.connectivity.subscribe();
        let triggers = [punch.trigger(), photo.trigger()];
        let reconnect = tokio::spawn(async move {
            loop {
                tokio::select! {
                    up = watcher.reconnected() => {
                        if !up {
                            return;
                        }
                        info!("Reconnected, syncing now");
                        for trigger in &triggers {
                            trigger.fire();
                        }
                    }
                    _ = stopped.changed() => return,
                }
            }
        });

        info!(kiosk = %self.ctx.kiosk_code, "Sync tasks started");
        KioskTasks {
            punch,
            photo,
            stop,
            reconnect,
        }
    }
}

/// Background tasks of a running kiosk. Dropping this stops them.
#[derive(Debug)]
pub struct KioskTasks {
    punch: Ticket,
    photo: Ticket,
    stop: watch::Sender<bool>,
    reconnect: JoinHandle<()>,
}

impl KioskTasks {
    /// Wake both sync tasks now.
    pub fn sync_soon(&self) {
        self.punch.fire();
        self.photo.fire();
    }

    /// Stop every task and wait for in-flight cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        self.punch.shutdown().await;
        self.photo.shutdown().await;
        let _ = self.reconnect.await;
        info!("Sync tasks stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[path = "kiosk_tests.rs"]
mod tests;
