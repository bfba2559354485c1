//! Task record: envelope + state + observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::StateWatch;
use crate::domain::{InputData, OutputData, TaskEnvelope, TaskId, TaskState};
use crate::error::CascadeError;

/// Enough room for every transition a task can make.
const STATE_CHANNEL_CAPACITY: usize = 8;

/// The single source of truth for one task.
///
/// Queue structures (ready list, dependency graph) hold TaskIds only.
/// Every transition goes through [`TaskRecord::transition`], which also
/// broadcasts it to observers.
#[derive(Debug)]
pub struct TaskRecord {
    pub envelope: TaskEnvelope,
    pub state: TaskState,
    pub depends_on: Option<TaskId>,
    pub output: Option<OutputData>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    states: broadcast::Sender<TaskState>,
}

impl TaskRecord {
    pub fn new(envelope: TaskEnvelope, depends_on: Option<TaskId>) -> Self {
        let now = Utc::now();
        let (states, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            envelope,
            state: TaskState::Pending,
            depends_on,
            output: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            states,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.envelope.task_id()
    }

    fn transition(&mut self, next: TaskState) -> Result<(), CascadeError> {
        if !self.state.can_transition_to(next) {
            return Err(CascadeError::InvalidTransition {
                task: self.task_id(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        // no receivers is fine: late observers get the state on subscribe
        let _ = self.states.send(next);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CascadeError> {
        self.transition(TaskState::Running)
    }

    pub fn mark_succeeded(&mut self, output: OutputData) -> Result<(), CascadeError> {
        self.output = Some(output);
        self.transition(TaskState::Succeeded)
    }

    pub fn mark_failed(&mut self, error: String) -> Result<(), CascadeError> {
        self.last_error = Some(error);
        self.transition(TaskState::Failed)
    }

    pub fn mark_cancelled(&mut self, reason: String) -> Result<(), CascadeError> {
        self.last_error = Some(reason);
        self.transition(TaskState::Cancelled)
    }

    /// Must be called under the queue lock so no transition slips between
    /// reading the current state and subscribing.
    pub fn subscribe(&self) -> StateWatch {
        StateWatch::new(self.task_id(), self.state, self.states.subscribe())
    }

    pub fn has_observers(&self) -> bool {
        self.states.receiver_count() > 0
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.task_id().to_string(),
            task_type: self.envelope.task_type().to_string(),
            state: self.state,
            depends_on: self.depends_on.map(|id| id.to_string()),
            input: self.envelope.input().clone(),
            output: self.output.clone(),
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable snapshot of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub task_type: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    pub input: InputData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
