//! cascade - runs the reference chain once and prints a JSON summary.
//!
//! Always runs the reference settings: chain id "001", second process
//! "002", 10s countdowns.
//! Stage messages and progress go to the log; stdout carries only the summary.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cascade_core::impls::{LogIndicator, LogSink, NetworkMonitor};
use cascade_core::orchestrator::ChainEvent;
use cascade_core::ports::TokioClock;
use cascade_core::queue::{QueueCounts, TaskQueue};
use cascade_core::{ChainStatus, Collaborators, Pipeline, PipelineConfig};

#[derive(Serialize)]
struct Summary {
    status: ChainStatus,
    counts: QueueCounts,
    journal: Vec<ChainEvent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::default();
    info!(correlation_id = %config.correlation_id, "wiring pipeline");

    let pipeline = Pipeline::build(
        config,
        Collaborators {
            constraints: Arc::new(NetworkMonitor::connected()),
            indicator: Arc::new(LogIndicator::new()),
            sink: Arc::new(LogSink),
            clock: Arc::new(TokioClock),
        },
    )?;

    let status = pipeline.run().await?;
    let summary = Summary {
        status,
        counts: pipeline.queue().counts_by_state(),
        journal: pipeline.orchestrator().journal(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    pipeline.shutdown().await;
    Ok(())
}
