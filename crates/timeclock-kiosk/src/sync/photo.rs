//! Photo evidence sync engine.
//!
//! Photos are only accepted once their punch is on the server, so
//! `no_matching_punch` backs off like any transient failure.

use std::sync::Arc;

use timeclock_core::ErrorCode;
use timeclock_core::db::unix_timestamp;
use tracing::{debug, info, warn};

use super::{Cooldown, CycleReport, Delivery, Readiness, SyncContext};
use crate::backoff::RetryPolicy;
use crate::client::{KioskApi, PhotoSubmission};
use crate::credentials::DeviceCredentials;
use crate::error::KioskError;
use crate::storage::{PhotoQueueDb, QueuedPhoto};

pub struct PhotoSync<A> {
    ctx: Arc<SyncContext<A>>,
    queue: PhotoQueueDb,
    cooldown: Cooldown,
}

impl<A: KioskApi> PhotoSync<A> {
    pub fn new(ctx: Arc<SyncContext<A>>, queue: PhotoQueueDb) -> Self {
        Self {
            ctx,
            queue,
            cooldown: Cooldown::default(),
        }
    }

    pub const fn queue(&self) -> &PhotoQueueDb {
        &self.queue
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, KioskError> {
        let cooldown = self.ctx.settings.snapshot().sync_cooldown();
        if !self.cooldown.try_begin(cooldown) {
            debug!("Photo sync skipped (cooldown)");
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        }
        self.drain().await
    }

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
        let items = self
            .queue
            .list_retryable(tunables.sync_batch_size, unix_timestamp())
            .await?;

        let mut report = CycleReport::default();
        for item in &items {
            report.attempted += 1;
            let Some(delivery) = self.submit(item, &credentials).await? else {
                report.dead += 1;
                continue;
            };
            match delivery {
                Delivery::Accepted { .. } => {
                    self.queue.dequeue(&item.event_uuid).await?;
                    report.delivered += 1;
                }
                Delivery::Terminal(code) => {
                    warn!(event_uuid = %item.event_uuid, code = code.as_str(), "Photo rejected by server, discarded");
                    self.queue.dequeue(&item.event_uuid).await?;
                    report.discarded += 1;
                }
                Delivery::Unauthorized(code) => {
                    self.ctx.revoke_locally(&credentials, code)?;
                    report.stalled = true;
                    break;
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
                        warn!(event_uuid = %item.event_uuid, attempts, %reason, "Photo gave up after max attempts");
                        self.queue.mark_dead(&item.event_uuid, &reason).await?;
                        report.dead += 1;
                    } else {
                        report.retried += 1;
                    }
                    if offline {
                        report.offline = true;
                        break;
                    }
                }
            }
        }
        self.ctx.status.finish_sync();

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                retried = report.retried,
                dead = report.dead,
                "Photo sync cycle complete"
            );
        }
        Ok(report)
    }

    /// Returns `None` if the row is unreadable and was parked as dead.
    async fn submit(
        &self,
        item: &QueuedPhoto,
        credentials: &DeviceCredentials,
    ) -> Result<Option<Delivery>, KioskError> {
        let action = match item.action() {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable photo");
                self.queue
                    .mark_dead(&item.event_uuid, ErrorCode::UnreadableItem.as_str())
                    .await?;
                return Ok(None);
            }
        };
        let submission = PhotoSubmission {
            event_uuid: &item.event_uuid,
            action,
            device_time: item.device_time,
            content_type: &item.content_type,
            bytes: &item.photo,
        };
        let result = self.ctx.api.upload_photo(&credentials.auth(), &submission).await;
        let delivery = Delivery::from_photo(&result);
        self.ctx.observe(&delivery);
        Ok(Some(delivery))
    }

    /// Try one freshly captured photo right away. Failures are left for
    /// the scheduled cycles.
    pub async fn deliver_now(
        &self,
        event_uuid: &str,
        credentials: &DeviceCredentials,
    ) -> Result<Delivery, KioskError> {
        let Some(item) = self.queue.get(event_uuid).await? else {
            return Ok(Delivery::Accepted { message: None });
        };
        let delivery = match self.submit(&item, credentials).await? {
            None => Delivery::Terminal(ErrorCode::UnreadableItem),
            Some(delivery) => {
                match &delivery {
                    Delivery::Accepted { .. } | Delivery::Terminal(_) => {
                        self.queue.dequeue(event_uuid).await?;
                    }
                    Delivery::Unauthorized(code) => self.ctx.revoke_locally(credentials, *code)?,
                    Delivery::Retryable { .. } => {}
                }
                delivery
            }
        };
        self.refresh_counts().await?;
        Ok(delivery)
    }

    pub async fn refresh_counts(&self) -> Result<(), KioskError> {
        self.ctx.status.set_photo_counts(self.queue.counts().await?);
        Ok(())
    }
}
