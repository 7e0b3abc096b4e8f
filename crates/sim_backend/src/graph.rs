//! # Dependency Graph
//!
//! Generic topological ordering over named nodes with declared dependency lists.
//! Both the subsystem registry and the component loader build one of these from
//! plain dependency data and refuse to continue unless it sorts cleanly.
//!
//! ## How It Works
//!
//! 1. **Add nodes** with their dependencies:
//!    ```ignore
//!    let mut graph = DependencyGraph::new();
//!    graph.add_node("stats", &[])?;
//!    graph.add_node("modifiers", &["stats"])?;
//!    ```
//!
//! 2. **Sort** - validates every dependency and detects cycles:
//!    ```ignore
//!    let order = graph.sort()?; // ["stats", "modifiers"]
//!    ```
//!
//! ## Algorithm
//!
//! Uses **Kahn's algorithm** with a FIFO queue seeded in registration order, so
//! independent nodes keep the order they were added in and the output is stable
//! for a given input.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Errors produced while building or sorting a dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    #[error("Unknown dependency: {missing} required by {referencing}")]
    UnknownDependency { referencing: String, missing: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// A single named node and the names it depends on
#[derive(Debug, Clone)]
pub struct Node<K> {
    pub name: K,
    pub dependencies: Vec<K>,
}

/// Dependency graph over nodes keyed by `K`
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    nodes: Vec<Node<K>>,
    index: HashMap<K, usize>,
}

impl<K> DependencyGraph<K>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a node (builder pattern). Names must be unique within the graph.
    pub fn add_node(&mut self, name: K, dependencies: &[K]) -> Result<&mut Self, GraphError> {
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }

        self.index.insert(name, self.nodes.len());
        self.nodes.push(Node {
            name,
            dependencies: dependencies.to_vec(),
        });
        Ok(self)
    }

    pub fn contains(&self, name: &K) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute a topological order: every dependency appears before its dependents.
    pub fn sort(&self) -> Result<Vec<K>, GraphError> {
        // Validate all dependencies exist before touching the graph
        for node in &self.nodes {
            for dep in &node.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        referencing: node.name.to_string(),
                        missing: dep.to_string(),
                    });
                }
            }
        }

        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        // Edges from each dependency to the node that declared it, in registration order
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[self.index[dep]].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(self.nodes[i].name);

            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::Cycle {
                path: self.find_cycle(&in_degree),
            });
        }

        Ok(order)
    }

    /// Walk unresolved dependencies from the first stuck node until a node repeats.
    ///
    /// Every node left with a non-zero in-degree has at least one unresolved
    /// dependency, so the walk always closes a loop.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = (0..self.nodes.len()).find(|&i| in_degree[i] > 0) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut current = start;

        loop {
            if let Some(pos) = path.iter().position(|&i| i == current) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].name.to_string())
                    .collect();
                cycle.push(self.nodes[current].name.to_string());
                return cycle;
            }

            path.push(current);

            let next = self.nodes[current]
                .dependencies
                .iter()
                .map(|dep| self.index[dep])
                .find(|&i| in_degree[i] > 0);

            match next {
                Some(i) => current = i,
                None => {
                    return path.iter().map(|&i| self.nodes[i].name.to_string()).collect();
                }
            }
        }
    }

    /// Visualize the dependency graph as DOT format (for documentation)
    pub fn to_dot(&self, title: &str) -> String {
        let mut dot = format!("digraph {} {{\n", title);
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box];\n\n");

        for node in &self.nodes {
            dot.push_str(&format!("  \"{}\";\n", node.name));

            for dep in &node.dependencies {
                dot.push_str(&format!("  \"{}\" -> \"{}\";\n", dep, node.name));
            }
        }

        dot.push_str("}\n");
        dot
    }
}

impl<K> Default for DependencyGraph<K>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Sort a set of nodes in one call.
pub fn sort_nodes<K>(nodes: &[Node<K>]) -> Result<Vec<K>, GraphError>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    let mut graph = DependencyGraph::new();
    for node in nodes {
        graph.add_node(node.name, &node.dependencies)?;
    }
    graph.sort()
}
