use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{OutputData, TaskEnvelope, TaskType};
use crate::error::CascadeError;

/// A handler for a specific task type.
///
/// Takes the whole `TaskEnvelope` so the handler can read whichever input
/// keys it needs.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, envelope: &TaskEnvelope) -> Result<OutputData, CascadeError>;
}

/// Registry of handlers (task_type -> handler).
///
/// Built during initialization (mutable), used during runtime (immutable),
/// so no locks are needed.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), CascadeError> {
        if self.handlers.contains_key(&task_type) {
            return Err(CascadeError::DuplicateHandler(task_type));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    pub fn get(&self, task_type: &TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runtime executes a `TaskEnvelope` by dispatching to a registered handler.
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute one envelope.
    pub async fn execute(&self, envelope: &TaskEnvelope) -> Result<OutputData, CascadeError> {
        let task_type = envelope.task_type();
        let handler = self
            .registry
            .get(task_type)
            .ok_or_else(|| CascadeError::HandlerNotFound(task_type.clone()))?;

        handler.handle(envelope).await
    }
}
