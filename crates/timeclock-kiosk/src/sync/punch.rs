//! Punch sync engine.

use std::sync::Arc;

use timeclock_core::ErrorCode;
use timeclock_core::db::unix_timestamp;
use timeclock_core::wire::PunchRequest;
use timeclock_crypto::PinCipher;
use tracing::{debug, info, warn};

use super::{Cooldown, CycleReport, Delivery, Readiness, SyncContext};
use crate::backoff::RetryPolicy;
use crate::client::KioskApi;
use crate::credentials::DeviceCredentials;
use crate::error::KioskError;
use crate::storage::{PunchQueueDb, QueuedPunch};

pub struct PunchSync<A> {
    ctx: Arc<SyncContext<A>>,
    queue: PunchQueueDb,
    cooldown: Cooldown,
}

/// Whether a cycle keeps going after an item.
enum Flow {
    Continue,
    Stop,
}

impl<A: KioskApi> PunchSync<A> {
    pub fn new(ctx: Arc<SyncContext<A>>, queue: PunchQueueDb) -> Self {
        Self {
            ctx,
            queue,
            cooldown: Cooldown::default(),
        }
    }

    pub const fn queue(&self) -> &PunchQueueDb {
        &self.queue
    }

    /// One scheduled cycle, skipped if the previous one started within the
    /// cooldown.
    pub async fn run_cycle(&self) -> Result<CycleReport, KioskError> {
        let cooldown = self.ctx.settings.snapshot().sync_cooldown();
        if !self.cooldown.try_begin(cooldown) {
            debug!("Punch sync skipped (cooldown)");
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        }
        self.drain().await
    }

    /// Deliver every due punch in one batch, ignoring the cooldown.
    pub async fn drain(&self) -> Result<CycleReport, KioskError> {
        let result = self.drain_batch().await;
        self.refresh_counts().await?;
        result
    }

    async fn drain_batch(&self) -> Result<CycleReport, KioskError> {
        let (tunables, credentials) = match self.ctx.prepare().await? {
            Readiness::Offline => {
                return Ok(CycleReport {
                    offline: true,
                    ..CycleReport::default()
                });
            }
            Readiness::Unpaired => {
                return Ok(CycleReport {
                    stalled: true,
                    ..CycleReport::default()
                });
            }
            Readiness::Ready {
                tunables,
                credentials,
            } => (tunables, credentials),
        };

        let policy = RetryPolicy::from(&*tunables);
        let cipher = self.ctx.vault.cipher(&credentials).await?;
        let items = self
            .queue
            .list_retryable(tunables.sync_batch_size, unix_timestamp())
            .await?;

        let mut report = CycleReport::default();
        for item in &items {
            report.attempted += 1;
            let flow = self
                .sync_item(item, &credentials, &cipher, &policy, &mut report)
                .await?;
            if matches!(flow, Flow::Stop) {
                break;
            }
        }
        self.ctx.status.finish_sync();

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                discarded = report.discarded,
                retried = report.retried,
                dead = report.dead,
                "Punch sync cycle complete"
            );
        }
        Ok(report)
    }

    async fn sync_item(
        &self,
        item: &QueuedPunch,
        credentials: &DeviceCredentials,
        cipher: &PinCipher,
        policy: &RetryPolicy,
        report: &mut CycleReport,
    ) -> Result<Flow, KioskError> {
        let Some(delivery) = self.submit(item, credentials, cipher).await? else {
            report.dead += 1;
            return Ok(Flow::Continue);
        };

        match delivery {
            Delivery::Accepted { .. } => {
                self.queue.dequeue(&item.event_uuid).await?;
                report.delivered += 1;
            }
            Delivery::Terminal(code) => {
                self.discard(item, code).await?;
                report.discarded += 1;
            }
            Delivery::Unauthorized(code) => {
                self.ctx.revoke_locally(credentials, code)?;
                report.stalled = true;
                return Ok(Flow::Stop);
            }
            Delivery::Retryable { reason, offline } => {
                let now = unix_timestamp();
                let next_try = u32::try_from(item.attempts + 1).unwrap_or(u32::MAX);
                let retry_at = policy.next_attempt_at(next_try, now);
                let attempts = self
                    .queue
                    .record_failure(&item.event_uuid, &reason, now, retry_at)
                    .await?;
                if policy.is_exhausted(u32::try_from(attempts).unwrap_or(u32::MAX)) {
                    warn!(event_uuid = %item.event_uuid, attempts, %reason, "Punch gave up after max attempts");
                    self.queue.mark_dead(&item.event_uuid, &reason).await?;
                    report.dead += 1;
                } else {
                    debug!(event_uuid = %item.event_uuid, attempts, %reason, "Punch will be retried");
                    report.retried += 1;
                }
                if offline {
                    report.offline = true;
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Decrypt and send one item. Returns `None` if the item could not be
    /// decrypted and was parked as dead.
    async fn submit(
        &self,
        item: &QueuedPunch,
        credentials: &DeviceCredentials,
        cipher: &PinCipher,
    ) -> Result<Option<Delivery>, KioskError> {
        let pin = match cipher.open(&item.pin_ciphertext) {
            Ok(pin) => pin,
            Err(e) => {
                warn!(event_uuid = %item.event_uuid, error = %e, "Queued punch cannot be decrypted");
                self.queue
                    .mark_dead(&item.event_uuid, ErrorCode::DecryptFailed.as_str())
                    .await?;
                self.ctx.status.set_message(ErrorCode::DecryptFailed.user_message());
                return Ok(None);
            }
        };

        let request = PunchRequest {
            event_uuid: Some(item.event_uuid.clone()),
            action: Some(item.action.clone()),
            pin: Some(pin.to_string()),
            device_time: Some(item.device_time),
        };
        let result = self.ctx.api.punch(&credentials.auth(), &request).await;
        let delivery = Delivery::from_punch(&result);
        self.ctx.observe(&delivery);
        Ok(Some(delivery))
    }

    async fn discard(&self, item: &QueuedPunch, code: ErrorCode) -> Result<(), KioskError> {
        info!(event_uuid = %item.event_uuid, code = code.as_str(), "Punch rejected by server, discarded");
        self.queue.dequeue(&item.event_uuid).await?;
        self.ctx.status.set_message(code.user_message());
        Ok(())
    }

    /// Try one freshly queued punch right away.
    ///
    /// Transient failures leave the item as it is for the scheduled cycles.
    pub async fn deliver_now(
        &self,
        event_uuid: &str,
        credentials: &DeviceCredentials,
    ) -> Result<Delivery, KioskError> {
        let Some(item) = self.queue.get(event_uuid).await? else {
            return Ok(Delivery::Accepted { message: None });
        };
        let cipher = self.ctx.vault.cipher(credentials).await?;

        let delivery = match self.submit(&item, credentials, &cipher).await? {
            None => Delivery::Terminal(ErrorCode::DecryptFailed),
            Some(Delivery::Accepted { message }) => {
                self.queue.dequeue(event_uuid).await?;
                Delivery::Accepted { message }
            }
            Some(Delivery::Terminal(code)) => {
                self.discard(&item, code).await?;
                Delivery::Terminal(code)
            }
            Some(Delivery::Unauthorized(code)) => {
                self.ctx.revoke_locally(credentials, code)?;
                Delivery::Unauthorized(code)
            }
            Some(retry @ Delivery::Retryable { .. }) => retry,
        };
        self.refresh_counts().await?;
        Ok(delivery)
    }

    pub async fn refresh_counts(&self) -> Result<(), KioskError> {
        self.ctx.status.set_punch_counts(self.queue.counts().await?);
        Ok(())
    }
}
