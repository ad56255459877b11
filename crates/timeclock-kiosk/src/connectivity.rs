//! Reachability tracking.
//!
//! Every ping and request outcome is reported here. Observers are notified
//! on the transition from offline to online so that queued work is sent
//! without waiting for the next tick.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Online,
    Offline,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Reachability>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(Reachability::Unknown),
        }
    }

    pub fn current(&self) -> Reachability {
        *self.tx.borrow()
    }

    /// Record whether the server answered. Returns `true` when this report
    /// moves the kiosk from offline to online.
    pub fn report(&self, reachable: bool) -> bool {
        let next = if reachable {
            Reachability::Online
        } else {
            Reachability::Offline
        };
        let previous = self.tx.send_replace(next);
        let came_online = previous == Reachability::Offline && next == Reachability::Online;
        if came_online {
            info!("Server reachable again");
        } else if previous != Reachability::Offline && next == Reachability::Offline {
            info!("Server unreachable, working offline");
        }
        came_online
    }

    /// Resolves each time the kiosk comes back online. Returns `false` once
    /// the monitor is gone.
    pub fn subscribe(&self) -> ReconnectWatcher {
        let mut rx = self.tx.subscribe();
        let last = *rx.borrow_and_update();
        ReconnectWatcher { rx, last }
    }
}

pub struct ReconnectWatcher {
    rx: watch::Receiver<Reachability>,
    last: Reachability,
}

impl ReconnectWatcher {
    /// Wait for the next offline to online transition.
    pub async fn reconnected(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let now = *self.rx.borrow_and_update();
            let previous = std::mem::replace(&mut self.last, now);
            if previous == Reachability::Offline && now == Reachability::Online {
                return true;
            }
        }
    }
}
