//! Timed background process: a fixed countdown on its own task that
//! publishes to a completion signal when it reaches zero.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::CorrelationId;
use crate::error::CascadeError;
use crate::ports::{Clock, ForegroundIndicator, IndicatorHandle};
use crate::signal::CompletionSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownSettings {
    /// First progress value; the countdown goes from here down to zero.
    pub start: u32,
    /// Wait before each progress update.
    pub tick: Duration,
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            start: 10,
            tick: Duration::from_secs(1),
        }
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Countdown reached zero and the id was published.
    Completed(CorrelationId),
    /// Launched without a correlation id; nothing ran.
    Rejected,
    /// Something broke mid-countdown; nothing was published.
    Failed(String),
}

/// Completion handle of a launched process.
pub struct ProcessHandle {
    name: String,
    join: JoinHandle<ProcessExit>,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> ProcessExit {
        match self.join.await {
            Ok(exit) => exit,
            Err(e) => ProcessExit::Failed(e.to_string()),
        }
    }
}

/// A launchable countdown bound to one completion signal.
///
/// Cloning shares the collaborators; each `launch` gets its own task, so
/// concurrent countdowns share no mutable state.
#[derive(Clone)]
pub struct BackgroundProcess {
    name: String,
    signal: Arc<CompletionSignal<CorrelationId>>,
    indicator: Arc<dyn ForegroundIndicator>,
    clock: Arc<dyn Clock>,
    settings: CountdownSettings,
}

impl BackgroundProcess {
    pub fn new(
        name: impl Into<String>,
        signal: Arc<CompletionSignal<CorrelationId>>,
        indicator: Arc<dyn ForegroundIndicator>,
        clock: Arc<dyn Clock>,
        settings: CountdownSettings,
    ) -> Self {
        Self {
            name: name.into(),
            signal,
            indicator,
            clock,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> &Arc<CompletionSignal<CorrelationId>> {
        &self.signal
    }

    /// Start the countdown. Never blocks the caller.
    pub fn launch(&self, id: Option<CorrelationId>) -> ProcessHandle {
        let name = self.name.clone();
        let Some(id) = id else {
            error!(process = %name, error = %CascadeError::MissingCorrelationId, "stopping");
            return ProcessHandle {
                name,
                join: tokio::spawn(async { ProcessExit::Rejected }),
            };
        };

        info!(process = %name, correlation_id = %id, "launching");
        let this = self.clone();
        ProcessHandle {
            name,
            join: tokio::spawn(this.run(id)),
        }
    }

    async fn run(self, id: CorrelationId) -> ProcessExit {
        let initial = format!("{} started for {id}", self.name);
        let handle = match self.indicator.start(&id, &initial) {
            Ok(handle) => handle,
            Err(e) => {
                error!(process = %self.name, error = %e, "could not start indicator");
                return ProcessExit::Failed(e.to_string());
            }
        };

        // The countdown gets its own task so a panic stops here.
        let countdown = tokio::spawn(countdown(
            self.name.clone(),
            Arc::clone(&self.indicator),
            Arc::clone(&self.clock),
            self.settings,
            handle,
        ));
        let outcome = match countdown.await {
            Ok(result) => result,
            Err(join_err) => Err(CascadeError::WorkerFailure(join_err.to_string())),
        };

        let exit = match outcome {
            Ok(()) => match self.signal.publish(id.clone()) {
                Ok(()) => {
                    info!(process = %self.name, correlation_id = %id, signal = %self.signal.name(), "countdown finished");
                    ProcessExit::Completed(id)
                }
                Err(e) => {
                    error!(process = %self.name, error = %e, "could not publish completion");
                    ProcessExit::Failed(e.to_string())
                }
            },
            Err(e) => {
                error!(process = %self.name, correlation_id = %id, error = %e, "countdown failed");
                ProcessExit::Failed(e.to_string())
            }
        };

        if let Err(e) = self.indicator.stop(handle) {
            warn!(process = %self.name, error = %e, "could not stop indicator");
        }
        exit
    }
}

async fn countdown(
    name: String,
    indicator: Arc<dyn ForegroundIndicator>,
    clock: Arc<dyn Clock>,
    settings: CountdownSettings,
    handle: IndicatorHandle,
) -> Result<(), CascadeError> {
    for remaining in (0..=settings.start).rev() {
        clock.sleep(settings.tick).await;
        indicator
            .update(handle, &format!("{remaining} seconds until last warning"))
            .map_err(|e| CascadeError::WorkerFailure(e.to_string()))?;
        debug!(process = %name, remaining, "tick");
    }
    Ok(())
}
