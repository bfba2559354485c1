//! The discrete units of work run by the task queue (Task A, B and C).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{INPUT_CORRELATION_ID, OutputData, TaskEnvelope};
use crate::error::CascadeError;
use crate::ports::Clock;
use crate::runtime::TaskHandler;

/// Output key naming the stage that produced the result.
pub const OUTPUT_COMPLETED_BY: &str = "completed_by";

/// Simulated work: needs the correlation id, takes `duration` on the
/// injected clock, echoes the id back.
pub struct SimulatedWork {
    label: String,
    duration: Duration,
    clock: Arc<dyn Clock>,
}

impl SimulatedWork {
    pub fn new(label: impl Into<String>, duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            label: label.into(),
            duration,
            clock,
        }
    }
}

#[async_trait]
impl TaskHandler for SimulatedWork {
    async fn handle(&self, envelope: &TaskEnvelope) -> Result<OutputData, CascadeError> {
        let id = envelope.correlation_id()?;
        debug!(stage = %self.label, correlation_id = %id, "working");
        self.clock.sleep(self.duration).await;

        Ok(OutputData::from([
            (INPUT_CORRELATION_ID.to_string(), id.to_string()),
            (OUTPUT_COMPLETED_BY.to_string(), self.label.clone()),
        ]))
    }
}
