use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Constraints, CorrelationId, TaskId};
use crate::error::CascadeError;

/// Input key carrying the chain correlation id.
pub const INPUT_CORRELATION_ID: &str = "correlation_id";

/// String key/value parameters handed to a task.
pub type InputData = BTreeMap<String, String>;

/// String key/value results produced by a successful task.
pub type OutputData = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// TaskType + input + constraints: everything a worker needs to run a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    task_type: TaskType,
    input: InputData,
    constraints: Constraints,
}

impl TaskEnvelope {
    pub fn new(task_type: TaskType, constraints: Constraints) -> Self {
        Self {
            task_id: TaskId::generate(),
            task_type,
            input: InputData::new(),
            constraints,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(self, id: &CorrelationId) -> Self {
        self.with_input(INPUT_CORRELATION_ID, id.as_str())
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn input(&self) -> &InputData {
        &self.input
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn correlation_id(&self) -> Result<CorrelationId, CascadeError> {
        self.input
            .get(INPUT_CORRELATION_ID)
            .map(|s| CorrelationId::new(s.as_str()))
            .ok_or(CascadeError::MissingInput(INPUT_CORRELATION_ID))
    }
}
