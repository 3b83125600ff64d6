//! Task dependency graph for pipeline execution.
//!
//! Tasks are nodes, and an edge `upstream -> task` means `task` needs
//! `upstream` to have succeeded first. The runner walks
//! [`TaskGraph::execution_order`] and asks [`TaskGraph::blocked_by`] before
//! running each task, so every dependent of a failed task is skipped.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    graph: DiGraph<T, ()>,
    index: HashMap<T, NodeIndex>,
    /// Insertion order, for deterministic tie-breaking.
    order: Vec<NodeIndex>,
}

impl<T> Default for TaskGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskGraph<T>
where
    T: Clone + Eq + Hash + Display,
{
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn add_task(&mut self, task: T) -> Result<(), GraphError> {
        if self.index.contains_key(&task) {
            return Err(GraphError::DuplicateTask {
                task: task.to_string(),
            });
        }
        let idx = self.graph.add_node(task.clone());
        self.index.insert(task, idx);
        self.order.push(idx);
        Ok(())
    }

    /// Declare that `task` runs only after `upstream` succeeded.
    pub fn add_dependency(&mut self, task: &T, upstream: &T) -> Result<(), GraphError> {
        let to = self.node(task)?;
        let from = self.node(upstream)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Direct predecessors of `task`, in insertion order.
    pub fn upstream(&self, task: &T) -> Result<Vec<T>, GraphError> {
        let idx = self.node(task)?;
        let mut preds: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        preds.sort_by_key(|n| self.position(*n));
        Ok(preds
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect())
    }

    /// Topological order (Kahn's algorithm); ties resolve in insertion order.
    pub fn execution_order(&self) -> Result<Vec<T>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> =
            self.graph.node_indices().map(|idx| (idx, 0)).collect();
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .order
            .iter()
            .filter(|idx| in_degree.get(*idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut result = Vec::with_capacity(self.len());
        while let Some(idx) = queue.pop_front() {
            if let Some(task) = self.graph.node_weight(idx) {
                result.push(task.clone());
            }
            let mut next: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            next.sort_by_key(|n| self.position(*n));
            for n in next {
                if let Some(deg) = in_degree.get_mut(&n) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(n);
                    }
                }
            }
        }

        if result.len() != self.len() {
            let task = self
                .order
                .iter()
                .find(|idx| in_degree.get(*idx).copied().unwrap_or(0) > 0)
                .and_then(|idx| self.graph.node_weight(*idx))
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            return Err(GraphError::CycleDetected { task });
        }
        Ok(result)
    }

    /// First upstream of `task` that has not succeeded, if any.
    pub fn blocked_by(
        &self,
        task: &T,
        statuses: &HashMap<T, TaskStatus>,
    ) -> Result<Option<T>, GraphError> {
        Ok(self
            .upstream(task)?
            .into_iter()
            .find(|up| statuses.get(up) != Some(&TaskStatus::Succeeded)))
    }

    fn node(&self, task: &T) -> Result<NodeIndex, GraphError> {
        self.index
            .get(task)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask {
                task: task.to_string(),
            })
    }

    fn position(&self, idx: NodeIndex) -> usize {
        self.order
            .iter()
            .position(|i| *i == idx)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> TaskGraph<&'static str> {
        let mut g = TaskGraph::new();
        for t in ["extract", "transform", "load", "aggregate"] {
            g.add_task(t).unwrap();
        }
        g.add_dependency(&"transform", &"extract").unwrap();
        g.add_dependency(&"load", &"transform").unwrap();
        g.add_dependency(&"aggregate", &"load").unwrap();
        g
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(
            chain().execution_order().unwrap(),
            vec!["extract", "transform", "load", "aggregate"]
        );
    }

    #[test]
    fn test_order_respects_edges_not_insertion() {
        let mut g = TaskGraph::new();
        g.add_task("report").unwrap();
        g.add_task("build").unwrap();
        g.add_task("fetch").unwrap();
        g.add_dependency(&"report", &"build").unwrap();
        g.add_dependency(&"build", &"fetch").unwrap();
        assert_eq!(g.execution_order().unwrap(), vec!["fetch", "build", "report"]);
    }

    #[test]
    fn test_independent_tasks_keep_insertion_order() {
        let mut g = TaskGraph::new();
        g.add_task("b").unwrap();
        g.add_task("a").unwrap();
        g.add_task("c").unwrap();
        g.add_dependency(&"c", &"a").unwrap();
        g.add_dependency(&"c", &"b").unwrap();
        assert_eq!(g.execution_order().unwrap(), vec!["b", "a", "c"]);
        assert_eq!(g.upstream(&"c").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut g = chain();
        g.add_dependency(&"extract", &"aggregate").unwrap();
        assert!(matches!(
            g.execution_order(),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_unknown_and_duplicate_tasks() {
        let mut g = chain();
        assert_eq!(
            g.add_dependency(&"load", &"publish"),
            Err(GraphError::UnknownTask {
                task: "publish".to_string()
            })
        );
        assert_eq!(
            g.add_task("load"),
            Err(GraphError::DuplicateTask {
                task: "load".to_string()
            })
        );
    }

    #[test]
    fn test_blocked_by_failed_or_skipped_upstream() {
        let g = chain();
        let mut statuses = HashMap::new();
        assert_eq!(g.blocked_by(&"extract", &statuses).unwrap(), None);
        assert_eq!(g.blocked_by(&"transform", &statuses).unwrap(), Some("extract"));

        statuses.insert("extract", TaskStatus::Succeeded);
        statuses.insert("transform", TaskStatus::Failed);
        assert_eq!(g.blocked_by(&"transform", &statuses).unwrap(), None);
        assert_eq!(g.blocked_by(&"load", &statuses).unwrap(), Some("transform"));

        statuses.insert("load", TaskStatus::Skipped);
        assert_eq!(g.blocked_by(&"aggregate", &statuses).unwrap(), Some("load"));
    }
}
