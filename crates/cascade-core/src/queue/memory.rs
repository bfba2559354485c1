//! In-memory queue implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{
    DependencyGraph, QueueCounts, StateWatch, TaskHandle, TaskInfo, TaskLease, TaskQueue,
    TaskRecord,
};
use crate::domain::{OutputData, TaskEnvelope, TaskId, TaskState};
use crate::error::CascadeError;
use crate::ports::ConstraintProvider;

/// In-memory queue state.
#[derive(Default)]
struct QueueState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, TaskRecord>,

    /// Pending tasks whose dependencies are satisfied, in enqueue order.
    /// Constraint gating happens at lease time.
    ready: VecDeque<TaskId>,

    graph: DependencyGraph,

    closed: bool,
}

impl QueueState {
    fn record_mut(&mut self, task_id: TaskId) -> Result<&mut TaskRecord, CascadeError> {
        self.records
            .get_mut(&task_id)
            .ok_or(CascadeError::UnknownTask(task_id))
    }

    fn counts_by_state(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Pop the first ready task whose constraints are met and mark it Running.
    fn take_runnable(&mut self, provider: &dyn ConstraintProvider) -> Option<TaskEnvelope> {
        let records = &self.records;
        self.ready.retain(|id| {
            records
                .get(id)
                .is_some_and(|r| r.state == TaskState::Pending)
        });

        let pos = self.ready.iter().position(|id| {
            self.records
                .get(id)
                .is_some_and(|r| provider.is_satisfied(r.envelope.constraints()))
        })?;
        let task_id = self.ready.remove(pos)?;
        let record = self.records.get_mut(&task_id)?;
        match record.start() {
            Ok(()) => Some(record.envelope.clone()),
            Err(e) => {
                warn!(%task_id, error = %e, "ready task could not start");
                None
            }
        }
    }

    fn complete(&mut self, task_id: TaskId, output: OutputData) -> Result<(), CascadeError> {
        self.record_mut(task_id)?.mark_succeeded(output)?;
        for waiting in self.graph.get_waiting_tasks(task_id) {
            self.graph.remove_dependency(waiting, task_id);
            let pending = self
                .records
                .get(&waiting)
                .is_some_and(|r| r.state == TaskState::Pending);
            if pending && !self.graph.has_dependencies(waiting) {
                debug!(task_id = %waiting, dependency = %task_id, "dependency satisfied");
                self.ready.push_back(waiting);
            }
        }
        Ok(())
    }

    fn fail(&mut self, task_id: TaskId, error: String) -> Result<(), CascadeError> {
        self.record_mut(task_id)?.mark_failed(error)?;
        self.cancel_dependents(task_id);
        Ok(())
    }

    /// Every Pending task transitively waiting on `root` becomes Cancelled.
    fn cancel_dependents(&mut self, root: TaskId) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for waiting in self.graph.get_waiting_tasks(node) {
                self.graph.remove_dependency(waiting, node);
                let Some(record) = self.records.get_mut(&waiting) else {
                    continue;
                };
                if record.state != TaskState::Pending {
                    continue;
                }
                let reason = CascadeError::DependencyFailed {
                    task: waiting,
                    dependency: node,
                };
                warn!(task_id = %waiting, dependency = %node, "dependency did not succeed, cancelling");
                if record.mark_cancelled(reason.to_string()).is_ok() {
                    self.graph.remove_dependencies_of(waiting);
                    stack.push(waiting);
                }
            }
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    constraints: Arc<dyn ConstraintProvider>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory queue implementation.
///
/// The lock is a plain `std::sync::Mutex`: it is never held across an
/// `.await`, which lets enqueue/observe be called from synchronous
/// callbacks on the delivery context.
pub struct InMemoryTaskQueue {
    shared: Arc<Shared>,
}

impl InMemoryTaskQueue {
    pub fn new(constraints: Arc<dyn ConstraintProvider>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                constraints,
            }),
        }
    }

    /// Drop terminal records nobody observes or waits on.
    pub fn prune_finished(&self) -> usize {
        let mut state = self.shared.lock();
        let QueueState { records, graph, .. } = &mut *state;
        let before = records.len();
        records.retain(|id, r| {
            !(r.state.is_terminal() && !r.has_observers() && !graph.has_waiting_tasks(*id))
        });
        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, "pruned finished tasks");
        }
        pruned
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(
        &self,
        envelope: TaskEnvelope,
        depends_on: Option<TaskHandle>,
    ) -> Result<TaskHandle, CascadeError> {
        let task_id = envelope.task_id();
        let task_type = envelope.task_type().clone();
        let dependency = depends_on.map(|h| h.id());
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(CascadeError::QueueClosed);
            }

            let mut record = TaskRecord::new(envelope, dependency);
            match dependency {
                None => state.ready.push_back(task_id),
                Some(dep) => {
                    let dep_state = state
                        .records
                        .get(&dep)
                        .map(|r| r.state)
                        .ok_or(CascadeError::UnknownTask(dep))?;
                    match dep_state {
                        TaskState::Succeeded => state.ready.push_back(task_id),
                        TaskState::Failed | TaskState::Cancelled => {
                            let reason = CascadeError::DependencyFailed {
                                task: task_id,
                                dependency: dep,
                            };
                            warn!(%task_id, dependency = %dep, "enqueued behind a dead dependency");
                            record.mark_cancelled(reason.to_string())?;
                        }
                        TaskState::Pending | TaskState::Running => {
                            state.graph.add_dependency(task_id, dep);
                        }
                    }
                }
            }
            state.records.insert(task_id, record);
        }

        info!(%task_id, %task_type, "task enqueued");
        self.shared.notify.notify_waiters();
        Ok(TaskHandle::from(task_id))
    }

    fn observe(&self, handle: TaskHandle) -> Result<StateWatch, CascadeError> {
        let state = self.shared.lock();
        state
            .records
            .get(&handle.id())
            .map(TaskRecord::subscribe)
            .ok_or(CascadeError::UnknownTask(handle.id()))
    }

    fn cancel(&self, handle: TaskHandle) -> Result<(), CascadeError> {
        let task_id = handle.id();
        let mut state = self.shared.lock();
        state
            .record_mut(task_id)?
            .mark_cancelled("cancelled by request".to_string())?;
        state.graph.remove_dependencies_of(task_id);
        state.cancel_dependents(task_id);
        info!(%task_id, "task cancelled");
        Ok(())
    }

    fn info(&self, handle: TaskHandle) -> Option<TaskInfo> {
        self.shared
            .lock()
            .records
            .get(&handle.id())
            .map(TaskRecord::info)
    }

    fn counts_by_state(&self) -> QueueCounts {
        self.shared.lock().counts_by_state()
    }

    async fn lease(&self) -> Option<Box<dyn TaskLease>> {
        let mut changes = self.shared.constraints.subscribe();
        let mut watching_constraints = true;
        loop {
            // Register interest before checking, so a notify between the
            // check and the wait is not lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if state.closed {
                    return None;
                }
                if let Some(envelope) = state.take_runnable(self.shared.constraints.as_ref()) {
                    debug!(task_id = %envelope.task_id(), "task leased");
                    return Some(Box::new(InMemoryLease {
                        task_id: envelope.task_id(),
                        envelope,
                        shared: Arc::clone(&self.shared),
                        settled: false,
                    }));
                }
            }

            if watching_constraints {
                tokio::select! {
                    _ = notified.as_mut() => {}
                    changed = changes.changed() => {
                        if changed.is_err() {
                            watching_constraints = false;
                        } else {
                            debug!("constraint condition changed, re-checking gated tasks");
                        }
                    }
                }
            } else {
                notified.as_mut().await;
            }
        }
    }

    fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

/// Lease implementation for InMemoryTaskQueue.
struct InMemoryLease {
    task_id: TaskId,
    envelope: TaskEnvelope,
    shared: Arc<Shared>,
    settled: bool,
}

impl InMemoryLease {
    fn settle(
        &mut self,
        f: impl FnOnce(&mut QueueState) -> Result<(), CascadeError>,
    ) -> Result<(), CascadeError> {
        self.settled = true;
        let result = f(&mut self.shared.lock());
        // Lock released before waking workers.
        self.shared.notify.notify_waiters();
        result
    }
}

impl TaskLease for InMemoryLease {
    fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    fn ack(mut self: Box<Self>, output: OutputData) -> Result<(), CascadeError> {
        let task_id = self.task_id;
        self.settle(|state| state.complete(task_id, output))
    }

    fn fail(mut self: Box<Self>, error: String) -> Result<(), CascadeError> {
        let task_id = self.task_id;
        self.settle(|state| state.fail(task_id, error))
    }
}

impl Drop for InMemoryLease {
    fn drop(&mut self) {
        if !self.settled {
            warn!(task_id = %self.task_id, "lease dropped without ack/fail");
            let task_id = self.task_id;
            let _ = self.settle(|state| state.fail(task_id, "lease abandoned".to_string()));
        }
    }
}
