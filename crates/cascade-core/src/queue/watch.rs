//! StateWatch - per-task state observation with replay of the current state.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::domain::{TaskId, TaskState};

/// A stream of a task's states.
///
/// The first item is always the state at subscription time, so an observer
/// attaching after the task finished still sees the terminal state. The
/// stream ends after a terminal state.
#[derive(Debug)]
pub struct StateWatch {
    task_id: TaskId,
    initial: Option<TaskState>,
    last: Option<TaskState>,
    rx: broadcast::Receiver<TaskState>,
}

impl StateWatch {
    pub(crate) fn new(task_id: TaskId, current: TaskState, rx: broadcast::Receiver<TaskState>) -> Self {
        Self {
            task_id,
            initial: Some(current),
            last: None,
            rx,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Next state, or `None` once a terminal state has been yielded (or the
    /// task record is gone).
    pub async fn next(&mut self) -> Option<TaskState> {
        if let Some(state) = self.initial.take() {
            self.last = Some(state);
            return Some(state);
        }
        if self.last.is_some_and(TaskState::is_terminal) {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(state) => {
                    self.last = Some(state);
                    return Some(state);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id = %self.task_id, skipped, "state observer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drain the stream and return the terminal state.
    pub async fn wait_terminal(&mut self) -> Option<TaskState> {
        while let Some(state) = self.next().await {
            if state.is_terminal() {
                return Some(state);
            }
        }
        None
    }
}
