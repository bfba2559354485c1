//! Task state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Failed
/// - Pending -> Cancelled (dependency failed/cancelled, or explicit cancel)
///
/// Running work is never cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for its dependency and/or its constraint gate.
    Pending,

    /// Currently being executed by a worker.
    Running,

    /// Successfully completed.
    Succeeded,

    /// The handler returned an error or panicked.
    Failed,

    /// Never ran.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Succeeded)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Pending, TaskState::Running, true)]
    #[case(TaskState::Pending, TaskState::Cancelled, true)]
    #[case(TaskState::Running, TaskState::Succeeded, true)]
    #[case(TaskState::Running, TaskState::Failed, true)]
    #[case(TaskState::Running, TaskState::Cancelled, false)]
    #[case(TaskState::Pending, TaskState::Succeeded, false)]
    #[case(TaskState::Succeeded, TaskState::Running, false)]
    #[case(TaskState::Failed, TaskState::Pending, false)]
    #[case(TaskState::Cancelled, TaskState::Running, false)]
    fn transitions_are_monotonic(
        #[case] from: TaskState,
        #[case] to: TaskState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(TaskState::Pending, false)]
    #[case(TaskState::Running, false)]
    #[case(TaskState::Succeeded, true)]
    #[case(TaskState::Failed, true)]
    #[case(TaskState::Cancelled, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
