//! Domain model: identifiers, task envelopes, states and constraints.

pub mod constraints;
pub mod ids;
pub mod state;
pub mod task;

pub use constraints::Constraints;
pub use ids::{CorrelationId, TaskId};
pub use state::TaskState;
pub use task::{INPUT_CORRELATION_ID, InputData, OutputData, TaskEnvelope, TaskType};
