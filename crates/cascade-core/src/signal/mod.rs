//! Signal - single-value broadcast channels and the context they deliver on.
//!
//! Every observer callback and every sequencing decision runs on one
//! [`DeliveryContext`]: a FIFO of jobs drained by a single task. Publishing
//! from a background worker therefore never runs observers on that worker.

pub mod completion;
pub mod delivery;

pub use self::completion::{CompletionSignal, Subscription};
pub use self::delivery::DeliveryContext;
