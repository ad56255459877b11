//! Cancellable periodic tasks.
//!
//! [`schedule_every`] runs a job immediately and then after every period,
//! where the period is re-read before each sleep so that settings changes
//! apply without a restart. The returned [`Ticket`] can wake the job early
//! and stops it when cancelled or dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a scheduled task.
#[derive(Debug)]
pub struct Ticket {
    name: &'static str,
    stop: watch::Sender<bool>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

/// Wakes a scheduled task without owning it.
#[derive(Debug, Clone)]
pub struct Trigger {
    wake: Arc<Notify>,
}

impl Trigger {
    /// Run the job now instead of at the end of the current period.
    pub fn fire(&self) {
        self.wake.notify_one();
    }
}

impl Ticket {
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn trigger(&self) -> Trigger {
        Trigger {
            wake: Arc::clone(&self.wake),
        }
    }

    pub fn fire(&self) {
        self.wake.notify_one();
    }

    /// Stop the task once the job in flight, if any, finishes.
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `job` now and then every `period()` until the ticket is cancelled.
pub fn schedule_every<P, F, Fut>(name: &'static str, period: P, job: F) -> Ticket
where
    P: Fn() -> Duration + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);
    let wake = Arc::new(Notify::new());
    let notified = Arc::clone(&wake);

    let handle = tokio::spawn(async move {
        loop {
            job().await;

            tokio::select! {
                () = tokio::time::sleep(period()) => {}
                () = notified.notified() => {
                    debug!(task = name, "Woken early");
                }
                _ = stopped.changed() => {
                    debug!(task = name, "Scheduled task stopped");
                    return;
                }
            }

            if *stopped.borrow() {
                return;
            }
        }
    });

    Ticket {
        name,
        stop,
        wake,
        handle: Some(handle),
    }
}
