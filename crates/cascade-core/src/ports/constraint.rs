//! ConstraintProvider port - the conditions behind a task's constraint gate.

use tokio::sync::watch;

use crate::domain::Constraints;

/// ConstraintProvider answers whether a set of constraints is met right now
/// and announces when the underlying condition changes.
///
/// The queue re-evaluates gated tasks on every change notification; an unmet
/// constraint keeps a task Pending, it never fails it.
pub trait ConstraintProvider: Send + Sync {
    fn is_satisfied(&self, constraints: &Constraints) -> bool;

    /// Receiver that observes a change whenever the condition flips.
    fn subscribe(&self) -> watch::Receiver<bool>;
}
