//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Constraints, CorrelationId};
use crate::orchestrator::ChainTable;
use crate::process::CountdownSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Correlation id the chain is started with.
    pub correlation_id: CorrelationId,

    /// Id the second background process is launched with.
    pub second_process_id: CorrelationId,

    pub countdown: CountdownSettings,

    /// How long each simulated task takes.
    pub task_work: Duration,

    /// Number of task queue workers.
    pub worker_count: usize,

    /// Gate every task on network reachability.
    pub require_network: bool,
}

impl PipelineConfig {
    /// Reference configuration: chain "001", second process "002",
    /// 10-step countdown with 1s ticks.
    pub fn default_v1() -> Self {
        Self {
            correlation_id: CorrelationId::from("001"),
            second_process_id: CorrelationId::from("002"),
            countdown: CountdownSettings::default(),
            task_work: Duration::from_secs(1),
            worker_count: 2,
            require_network: true,
        }
    }

    pub fn task_constraints(&self) -> Constraints {
        if self.require_network {
            Constraints::network_connected()
        } else {
            Constraints::none()
        }
    }

    /// The reference chain, built from these settings.
    pub fn chain_table(&self) -> ChainTable {
        ChainTable::reference(self.task_constraints(), self.second_process_id.clone())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::default_v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_chain() {
        let config = PipelineConfig::default();
        assert_eq!(config.correlation_id.as_str(), "001");
        assert_eq!(config.second_process_id.as_str(), "002");
        assert_eq!(config.countdown.start, 10);
        assert_eq!(config.countdown.tick, Duration::from_secs(1));
        assert!(config.require_network);
        assert!(config.task_constraints().requires_network);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"correlation_id": "042", "worker_count": 1}"#).unwrap();
        assert_eq!(config.correlation_id.as_str(), "042");
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.second_process_id.as_str(), "002");
    }
}
