//! Dependency graph for managing task dependencies.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges must be kept in sync
//!
//! Edges only ever point at tasks that already exist, so the graph cannot
//! contain a cycle.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::domain::TaskId;

/// Dependency graph for tracking task dependencies.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: task -> tasks it depends on (waits for)
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// Reverse edges: task -> tasks that depend on it (waiting tasks)
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Example: add_dependency(task_b, task_a) means "B waits for A"
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    /// Remove a dependency: `task` no longer depends on `depends_on`.
    pub fn remove_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        if let Entry::Occupied(mut e) = self.edges.entry(task) {
            e.get_mut().remove(&depends_on);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(depends_on) {
            e.get_mut().remove(&task);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    /// Drop every edge where `task` is the waiting side.
    pub fn remove_dependencies_of(&mut self, task: TaskId) {
        for dep in self.get_dependencies(task) {
            self.remove_dependency(task, dep);
        }
    }

    /// Tasks waiting for `task`.
    ///
    /// Note: this returns ALL tasks waiting for it, even if they have other
    /// dependencies. The caller must check whether all are resolved.
    pub fn get_waiting_tasks(&self, task: TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(&task)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: TaskId) -> bool {
        self.edges
            .get(&task)
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }

    pub fn has_waiting_tasks(&self, task: TaskId) -> bool {
        self.reverse_edges
            .get(&task)
            .map(|waiting| !waiting.is_empty())
            .unwrap_or(false)
    }

    pub fn get_dependencies(&self, task: TaskId) -> Vec<TaskId> {
        self.edges
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(!graph.has_dependencies(TaskId::generate()));
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();

        graph.add_dependency(task_b, task_a); // B depends on A

        assert!(graph.has_dependencies(task_b));
        assert!(!graph.has_dependencies(task_a));
        assert_eq!(graph.get_dependencies(task_b), vec![task_a]);
        assert_eq!(graph.get_waiting_tasks(task_a), vec![task_b]);
        assert!(graph.has_waiting_tasks(task_a));
    }

    #[test]
    fn remove_dependency_removes_both_edges() {
        let mut graph = DependencyGraph::new();
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();

        graph.add_dependency(task_b, task_a);
        graph.remove_dependency(task_b, task_a);

        assert!(!graph.has_dependencies(task_b));
        assert!(graph.get_waiting_tasks(task_a).is_empty());
        assert!(!graph.has_waiting_tasks(task_a));
    }

    #[test]
    fn remove_dependencies_of_clears_only_that_task() {
        let mut graph = DependencyGraph::new();
        let a = TaskId::generate();
        let b = TaskId::generate();
        let c = TaskId::generate();

        // C depends on both A and B; B depends on A
        graph.add_dependency(c, a);
        graph.add_dependency(c, b);
        graph.add_dependency(b, a);

        graph.remove_dependencies_of(c);

        assert!(!graph.has_dependencies(c));
        assert!(graph.has_dependencies(b));
        assert_eq!(graph.get_waiting_tasks(a), vec![b]);
    }
}
