//! Pipeline assembly: builds every component from a [`PipelineConfig`] and
//! the platform collaborators, then runs one chain.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::PipelineConfig;
use crate::domain::CorrelationId;
use crate::error::CascadeError;
use crate::handlers::SimulatedWork;
use crate::orchestrator::{ChainStatus, Orchestrator};
use crate::ports::{Clock, ConstraintProvider, ForegroundIndicator, MessageSink};
use crate::process::BackgroundProcess;
use crate::queue::{InMemoryTaskQueue, TaskQueue};
use crate::runtime::{HandlerRegistry, Runtime};
use crate::signal::{CompletionSignal, DeliveryContext};
use crate::worker::WorkerGroup;

/// Platform side of the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub constraints: Arc<dyn ConstraintProvider>,
    pub indicator: Arc<dyn ForegroundIndicator>,
    pub sink: Arc<dyn MessageSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<InMemoryTaskQueue>,
    workers: WorkerGroup,
    delivery: DeliveryContext,
    delivery_join: JoinHandle<()>,
    signals: Vec<Arc<CompletionSignal<CorrelationId>>>,
    orchestrator: Orchestrator,
}

impl Pipeline {
    /// Wire the reference chain. Must be called inside a tokio runtime.
    pub fn build(config: PipelineConfig, parts: Collaborators) -> Result<Self, CascadeError> {
        let table = config.chain_table();

        let mut registry = HandlerRegistry::new();
        for template in &table.tasks {
            registry.register(
                template.task_type.clone(),
                Arc::new(SimulatedWork::new(
                    template.stage.as_str(),
                    config.task_work,
                    Arc::clone(&parts.clock),
                )),
            )?;
        }

        let queue = Arc::new(InMemoryTaskQueue::new(parts.constraints));
        let workers = WorkerGroup::spawn(
            config.worker_count,
            queue.clone(),
            Arc::new(Runtime::new(Arc::new(registry))),
        );

        let (delivery, delivery_join) = DeliveryContext::spawn();
        let mut builder = Orchestrator::builder(table, queue.clone(), delivery.clone(), parts.sink);
        let mut signals = Vec::new();
        for (process, signal) in [("process_1", "signal_1"), ("process_2", "signal_2")] {
            let signal = Arc::new(CompletionSignal::new(signal, delivery.clone()));
            signals.push(Arc::clone(&signal));
            builder = builder.process(
                process,
                BackgroundProcess::new(
                    process,
                    signal,
                    Arc::clone(&parts.indicator),
                    Arc::clone(&parts.clock),
                    config.countdown,
                ),
            );
        }
        let orchestrator = builder.build()?;

        Ok(Self {
            config,
            queue,
            workers,
            delivery,
            delivery_join,
            signals,
            orchestrator,
        })
    }

    pub fn queue(&self) -> &Arc<InMemoryTaskQueue> {
        &self.queue
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn delivery(&self) -> &DeliveryContext {
        &self.delivery
    }

    pub fn signal(&self, name: &str) -> Option<&Arc<CompletionSignal<CorrelationId>>> {
        self.signals.iter().find(|s| s.name() == name)
    }

    /// Start the chain with the configured id and wait until it settles.
    pub async fn run(&self) -> Result<ChainStatus, CascadeError> {
        self.orchestrator.start(self.config.correlation_id.clone())?;
        let status = self.orchestrator.wait_until_settled().await;
        // let queued observer callbacks land before anyone reads results
        self.delivery.flush().await?;
        info!(?status, "chain settled");
        Ok(status)
    }

    /// Stop the workers, then the delivery context. Processes still
    /// counting down are left to finish on their own.
    pub async fn shutdown(self) {
        self.queue.close();
        self.workers.shutdown_and_join().await;
        // observers of stalled tasks keep clones of the context alive
        self.delivery_join.abort();
    }
}
