//! cascade-core
//!
//! Building blocks for a chained background pipeline: a scheduled task
//! queue, timed background processes, completion signals, and the
//! orchestrator that turns one stage's completion into the next stage's
//! start.
//!
//! # Modules
//! - **domain**: ids, task envelopes, task states, constraints
//! - **ports**: external collaborators (clock, indicator, message sink, constraint provider)
//! - **impls**: implementations of the ports (network monitor, log-backed and recording doubles)
//! - **queue**: dependency-respecting, constraint-gated task queue with state observation
//! - **runtime** / **worker**: handler registry and the worker pool that drains the queue
//! - **handlers**: the discrete units of work
//! - **signal**: delivery context and latest-wins completion signals
//! - **process**: timed countdown processes
//! - **orchestrator**: the (trigger -> action) table and its wiring
//! - **config** / **pipeline**: settings and the assembled pipeline

pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod impls;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod process;
pub mod queue;
pub mod runtime;
pub mod signal;
pub mod worker;

pub use config::PipelineConfig;
pub use error::CascadeError;
pub use orchestrator::{ChainStatus, ChainTable, Orchestrator};
pub use pipeline::{Collaborators, Pipeline};
