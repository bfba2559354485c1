//! Queue module: the scheduled task queue.
//!
//! The queue owns every task state transition. Workers lease runnable tasks
//! and report back through the lease; everyone else only observes.

mod dependency;
mod memory;
mod record;
mod watch;

pub use dependency::DependencyGraph;
pub use memory::InMemoryTaskQueue;
pub use record::{TaskInfo, TaskRecord};
pub use watch::StateWatch;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{OutputData, TaskEnvelope, TaskId};
use crate::error::CascadeError;

/// Handle returned by `enqueue`, used to observe or cancel the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(TaskId);

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.0
    }
}

impl From<TaskId> for TaskHandle {
    fn from(id: TaskId) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// A leased task for processing.
/// The worker owns this lease and must either `ack` or `fail`.
///
/// Design intent:
/// - Queue manages state transitions (Pending -> Running -> ...).
/// - Worker/Runtime executes side effects and reports the result.
/// - Dropping a lease without settling it marks the task Failed, so a task
///   can never be stuck in Running.
pub trait TaskLease: Send {
    fn envelope(&self) -> &TaskEnvelope;

    /// Mark success and release dependents.
    fn ack(self: Box<Self>, output: OutputData) -> Result<(), CascadeError>;

    /// Mark failure and cancel dependents.
    fn fail(self: Box<Self>, error: String) -> Result<(), CascadeError>;
}

/// Queue port (interface).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, optionally gated on another task's success.
    fn enqueue(
        &self,
        envelope: TaskEnvelope,
        depends_on: Option<TaskHandle>,
    ) -> Result<TaskHandle, CascadeError>;

    /// Enqueue a linear chain: every task depends on the one before it.
    fn enqueue_chain(&self, envelopes: Vec<TaskEnvelope>) -> Result<Vec<TaskHandle>, CascadeError> {
        let mut handles: Vec<TaskHandle> = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let handle = self.enqueue(envelope, handles.last().copied())?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Observe every state transition, starting with the current state.
    fn observe(&self, handle: TaskHandle) -> Result<StateWatch, CascadeError>;

    /// Cancel a Pending task (and, transitively, its dependents).
    fn cancel(&self, handle: TaskHandle) -> Result<(), CascadeError>;

    fn info(&self, handle: TaskHandle) -> Option<TaskInfo>;

    fn counts_by_state(&self) -> QueueCounts;

    /// Lease one runnable task. Waits until one is available; `None` once closed.
    async fn lease(&self) -> Option<Box<dyn TaskLease>>;

    /// Stop handing out leases.
    fn close(&self);
}
