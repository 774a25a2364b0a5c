// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::errors::{Result, ServiceError};
use crate::types::TaskName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    name: TaskName,
    /// Direct dependencies: tasks that must be running before this one starts.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// Dependency graph keyed by task name, remembering registration order.
///
/// Edge direction is `dependency -> dependent`. For a task `B` declaring a
/// dependency on `A` we add the edge `A -> B`.
///
/// Node `i` of the underlying petgraph graph is the `i`-th registered task,
/// which is what makes the resolved order deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DagNode>,
    index: HashMap<TaskName, usize>,
    graph: DiGraph<usize, ()>,
}

impl DependencyGraph {
    /// Build a graph from `(task, dependencies)` pairs in registration order.
    ///
    /// Fails on duplicate task names and on dependencies that were never
    /// registered. Cycles are only detected by [`DependencyGraph::resolve`].
    pub fn build<I, D>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaskName, D)>,
        D: IntoIterator<Item = TaskName>,
    {
        let mut nodes: Vec<DagNode> = Vec::new();
        let mut index: HashMap<TaskName, usize> = HashMap::new();

        // First pass: create nodes with their (deduplicated) dependency lists.
        for (name, deps) in tasks {
            if index.contains_key(&name) {
                return Err(ServiceError::DuplicateTask(name));
            }

            let mut unique: Vec<TaskName> = Vec::new();
            for dep in deps {
                if !unique.contains(&dep) {
                    unique.push(dep);
                }
            }

            index.insert(name.clone(), nodes.len());
            nodes.push(DagNode {
                name,
                deps: unique,
                dependents: Vec::new(),
            });
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), 0);
        for i in 0..nodes.len() {
            graph.add_node(i);
        }

        // Second pass: check references, add edges and populate dependents.
        for i in 0..nodes.len() {
            let deps = nodes[i].deps.clone();
            for dep in deps {
                let Some(&j) = index.get(&dep) else {
                    return Err(ServiceError::UnknownDependency {
                        task: nodes[i].name.clone(),
                        dependency: dep,
                    });
                };

                graph.update_edge(NodeIndex::new(j), NodeIndex::new(i), ());
                let dependent = nodes[i].name.clone();
                nodes[j].dependents.push(dependent);
            }
        }

        Ok(Self {
            nodes,
            index,
            graph,
        })
    }

    /// All task names in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.index
            .get(name)
            .map(|&i| self.nodes[i].deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.index
            .get(name)
            .map(|&i| self.nodes[i].dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Compute the start order (Kahn's algorithm).
    ///
    /// Among several tasks whose dependencies are all placed, the one
    /// registered first goes first, so the same registration always yields
    /// the same order.
    pub fn resolve(&self) -> Result<StartOrder> {
        let n = self.nodes.len();
        let mut in_degree: Vec<usize> = (0..n)
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<TaskName> = Vec::with_capacity(n);

        while let Some(i) = ready.pop_first() {
            order.push(self.nodes[i].name.clone());

            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            {
                let j = next.index();
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < n {
            return Err(ServiceError::DependencyCycle(self.describe_cycles()));
        }

        debug!(?order, "resolved task start order");
        Ok(StartOrder { order })
    }

    /// Human-readable list of every strongly connected component that forms
    /// a cycle, with member tasks in registration order.
    fn describe_cycles(&self) -> String {
        let mut cycles: Vec<Vec<usize>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| self.graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut members: Vec<usize> = component.iter().map(|n| n.index()).collect();
                members.sort_unstable();
                members
            })
            .collect();
        cycles.sort();

        cycles
            .iter()
            .map(|members| {
                let names: Vec<&str> = members
                    .iter()
                    .map(|&i| self.nodes[i].name.as_str())
                    .collect();
                format!("cycle among tasks [{}]", names.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A resolved topological order.
///
/// Start order is the forward order; stop order is its exact reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOrder {
    order: Vec<TaskName>,
}

impl StartOrder {
    pub fn start(&self) -> &[TaskName] {
        &self.order
    }

    pub fn stop(&self) -> Vec<TaskName> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
