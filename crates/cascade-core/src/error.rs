use thiserror::Error;

use crate::domain::{TaskId, TaskState, TaskType};

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("background process launched without a correlation id")]
    MissingCorrelationId,

    #[error("worker failure: {0}")]
    WorkerFailure(String),

    #[error("task {task} cancelled: dependency {dependency} did not succeed")]
    DependencyFailed { task: TaskId, dependency: TaskId },

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("task {task}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("handler not found for task_type={0}")]
    HandlerNotFound(TaskType),

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),

    #[error("missing input key `{0}`")]
    MissingInput(&'static str),

    #[error("indicator error: {0}")]
    Indicator(String),

    #[error("delivery context is closed")]
    DeliveryClosed,

    #[error("task queue is closed")]
    QueueClosed,

    #[error("unknown stage `{0}`")]
    UnknownStage(String),
}
