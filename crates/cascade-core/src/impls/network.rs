//! NetworkMonitor - a network reachability flag shared through a watch channel.

use tokio::sync::watch;

use crate::domain::Constraints;
use crate::ports::ConstraintProvider;

/// NetworkMonitor holds the current "network connected" condition.
///
/// Flipping it with [`NetworkMonitor::set_connected`] wakes every subscriber,
/// which is how the queue learns that gated tasks should be re-checked.
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(connected: bool) -> Self {
        let (tx, _rx) = watch::channel(connected);
        Self { tx }
    }

    pub fn connected() -> Self {
        Self::new(true)
    }

    pub fn disconnected() -> Self {
        Self::new(false)
    }

    pub fn set_connected(&self, connected: bool) {
        // send_if_modified so subscribers only wake on an actual flip
        self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ConstraintProvider for NetworkMonitor {
    fn is_satisfied(&self, constraints: &Constraints) -> bool {
        !constraints.requires_network || self.is_connected()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
