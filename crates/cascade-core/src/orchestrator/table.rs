//! The chain topology as data: (trigger -> action) rules.

use std::fmt;

use serde::Serialize;

use crate::domain::{Constraints, CorrelationId, TaskType};

/// Name of a stage (task, process or signal) in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Trigger {
    /// The named task reached Succeeded.
    TaskSucceeded(StageName),
    /// The named completion signal published a value.
    SignalPublished(StageName),
}

/// Which id a launched process receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IdSource {
    /// The id that came with the trigger.
    Trigger,
    Fixed(CorrelationId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    /// Only surface the message.
    Notify,
    EnqueueTask(StageName),
    LaunchProcess { process: StageName, id: IdSource },
    /// End of the chain.
    Finish,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger: Trigger,
    pub action: Action,
    /// Message template; `{id}` is replaced with the trigger's id.
    pub message: String,
}

impl Rule {
    pub fn new(trigger: Trigger, action: Action, message: impl Into<String>) -> Self {
        Self {
            trigger,
            action,
            message: message.into(),
        }
    }

    pub fn render_message(&self, id: &CorrelationId) -> String {
        self.message.replace("{id}", id.as_str())
    }
}

/// How to build the task for a stage.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub stage: StageName,
    pub task_type: TaskType,
    pub constraints: Constraints,
}

/// Whole chain: task templates, the initial chain, and the rules.
#[derive(Debug, Clone)]
pub struct ChainTable {
    pub tasks: Vec<TaskTemplate>,
    /// Enqueued at start as a dependency chain.
    pub initial: Vec<StageName>,
    pub rules: Vec<Rule>,
}

impl ChainTable {
    /// Task A -> Task B -> Process 1 -> Task C -> Process 2.
    pub fn reference(constraints: Constraints, second_process_id: CorrelationId) -> Self {
        let task = |name: &str| TaskTemplate {
            stage: StageName::from(name),
            task_type: TaskType::new(name),
            constraints,
        };
        Self {
            tasks: vec![task("task_a"), task("task_b"), task("task_c")],
            initial: vec!["task_a".into(), "task_b".into()],
            rules: vec![
                Rule::new(
                    Trigger::TaskSucceeded("task_a".into()),
                    Action::Notify,
                    "First process is done",
                ),
                Rule::new(
                    Trigger::TaskSucceeded("task_b".into()),
                    Action::LaunchProcess {
                        process: "process_1".into(),
                        id: IdSource::Trigger,
                    },
                    "Second process is done",
                ),
                Rule::new(
                    Trigger::SignalPublished("signal_1".into()),
                    Action::EnqueueTask("task_c".into()),
                    "Process for Notification Channel ID {id} is done!",
                ),
                Rule::new(
                    Trigger::TaskSucceeded("task_c".into()),
                    Action::LaunchProcess {
                        process: "process_2".into(),
                        id: IdSource::Fixed(second_process_id),
                    },
                    "Third process is done",
                ),
                Rule::new(
                    Trigger::SignalPublished("signal_2".into()),
                    Action::Finish,
                    "Process for Second Notification Channel ID {id} is done!",
                ),
            ],
        }
    }

    pub fn template(&self, stage: &StageName) -> Option<&TaskTemplate> {
        self.tasks.iter().find(|t| &t.stage == stage)
    }

    /// Rules for a trigger, with their index in the table.
    pub fn rules_for<'a>(&'a self, trigger: &'a Trigger) -> impl Iterator<Item = (usize, &'a Rule)> + 'a {
        self.rules
            .iter()
            .enumerate()
            .filter(move |(_, r)| &r.trigger == trigger)
    }

    /// Signals the table listens to.
    pub fn signals(&self) -> Vec<StageName> {
        self.rules
            .iter()
            .filter_map(|r| match &r.trigger {
                Trigger::SignalPublished(name) => Some(name.clone()),
                Trigger::TaskSucceeded(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ChainTable {
        ChainTable::reference(Constraints::network_connected(), "002".into())
    }

    #[test]
    fn reference_chain_starts_with_a_then_b() {
        let t = table();
        assert_eq!(t.initial, vec![StageName::from("task_a"), StageName::from("task_b")]);
        assert!(t.template(&"task_c".into()).is_some());
        assert!(t.template(&"process_1".into()).is_none());
    }

    #[test]
    fn task_b_success_launches_process_one() {
        let t = table();
        let trigger = Trigger::TaskSucceeded("task_b".into());
        let rules: Vec<_> = t.rules_for(&trigger).collect();

        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].1.action,
            Action::LaunchProcess {
                process: "process_1".into(),
                id: IdSource::Trigger
            }
        );
    }

    #[test]
    fn second_process_uses_fixed_id() {
        let t = table();
        let trigger = Trigger::TaskSucceeded("task_c".into());
        let (_, rule) = t.rules_for(&trigger).next().unwrap();
        assert!(matches!(
            &rule.action,
            Action::LaunchProcess { id: IdSource::Fixed(id), .. } if id.as_str() == "002"
        ));
    }

    #[test]
    fn messages_render_the_id() {
        let t = table();
        let trigger = Trigger::SignalPublished("signal_1".into());
        let (_, rule) = t.rules_for(&trigger).next().unwrap();
        assert_eq!(
            rule.render_message(&"001".into()),
            "Process for Notification Channel ID 001 is done!"
        );
    }

    #[test]
    fn signals_listed_in_rule_order() {
        assert_eq!(
            table().signals(),
            vec![StageName::from("signal_1"), StageName::from("signal_2")]
        );
    }
}
