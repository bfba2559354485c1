//! Execution constraints gating when a task may run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Only run while the network is reachable.
    pub requires_network: bool,
}

impl Constraints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn network_connected() -> Self {
        Self {
            requires_network: true,
        }
    }
}
