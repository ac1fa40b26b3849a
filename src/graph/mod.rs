//! Prerequisite graph between lessons.
//!
//! Nodes are unique lesson names; a directed edge `A → B` means "A requires
//! B" (B must be learned first). The graph as proposed by the collaborator
//! may contain self-loops and cycles; [`resolve`] repairs it. Cycle
//! enumeration uses an explicit visit-state DFS rather than call-stack
//! recursion, since lesson graphs from large documents can be large.

mod builder;
pub mod resolve;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

pub use builder::build_prerequisite_graph;
pub use resolve::CycleResolver;

/// Directed "requires" graph over lesson names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteGraph {
    /// lesson → its prerequisites. Every node is present as a key, even
    /// with no prerequisites.
    prerequisites: BTreeMap<String, BTreeSet<String>>,
}

impl PrerequisiteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. No-op if already present.
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.prerequisites.entry(name.into()).or_default();
    }

    /// Add edge `lesson → prerequisite`. Both endpoints are registered.
    pub fn add_edge(&mut self, lesson: impl Into<String>, prerequisite: impl Into<String>) {
        let prerequisite = prerequisite.into();
        self.add_node(prerequisite.clone());
        self.prerequisites
            .entry(lesson.into())
            .or_default()
            .insert(prerequisite);
    }

    pub fn remove_edge(&mut self, lesson: &str, prerequisite: &str) -> bool {
        self.prerequisites
            .get_mut(lesson)
            .map(|p| p.remove(prerequisite))
            .unwrap_or(false)
    }

    pub fn has_edge(&self, lesson: &str, prerequisite: &str) -> bool {
        self.prerequisites
            .get(lesson)
            .map(|p| p.contains(prerequisite))
            .unwrap_or(false)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.prerequisites.keys()
    }

    pub fn node_count(&self) -> usize {
        self.prerequisites.len()
    }

    pub fn edge_count(&self) -> usize {
        self.prerequisites.values().map(|p| p.len()).sum()
    }

    pub fn prerequisites_of(&self, lesson: &str) -> impl Iterator<Item = &String> {
        self.prerequisites.get(lesson).into_iter().flatten()
    }

    /// Every edge as `(lesson, prerequisite)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (&String, &String)> {
        self.prerequisites
            .iter()
            .flat_map(|(lesson, prereqs)| prereqs.iter().map(move |p| (lesson, p)))
    }

    /// Remove all `node → node` edges. Returns how many were stripped.
    pub fn strip_self_loops(&mut self) -> usize {
        let mut stripped = 0;
        for (lesson, prereqs) in self.prerequisites.iter_mut() {
            if prereqs.remove(lesson.as_str()) {
                stripped += 1;
            }
        }
        stripped
    }

    /// Enumerate simple cycles by DFS from every node.
    ///
    /// A cycle is emitted when the walk revisits a node currently on the
    /// path: the slice from that node's first occurrence through the current
    /// node, closed by repeating the start. Rotations of the same cycle are
    /// deduplicated.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = Vec::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();

        for start in self.prerequisites.keys() {
            self.dfs_cycles_from(start, &mut cycles, &mut seen);
        }
        cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.find_cycles().is_empty()
    }

    fn dfs_cycles_from(
        &self,
        start: &str,
        cycles: &mut Vec<Vec<String>>,
        seen: &mut HashSet<Vec<String>>,
    ) {
        // Explicit frame stack: (node, index into its prerequisite list)
        let mut frames: Vec<(String, Vec<String>, usize)> = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut done: HashSet<String> = HashSet::new();

        let neighbors = |n: &str| -> Vec<String> {
            self.prerequisites
                .get(n)
                .map(|p| p.iter().cloned().collect())
                .unwrap_or_default()
        };

        frames.push((start.to_string(), neighbors(start), 0));
        path.push(start.to_string());
        on_path.insert(start.to_string());

        while let Some(frame) = frames.last_mut() {
            if frame.2 >= frame.1.len() {
                let node = frame.0.clone();
                frames.pop();
                done.insert(node.clone());
                on_path.remove(&node);
                path.pop();
                continue;
            }
            let next = frame.1[frame.2].clone();
            frame.2 += 1;

            if on_path.contains(&next) {
                // Path slice from next's first occurrence, closed by
                // repeating the start node.
                if let Some(pos) = path.iter().position(|n| n == &next) {
                    let mut cycle: Vec<String> = path[pos..].to_vec();
                    cycle.push(next.clone());
                    if seen.insert(canonical_rotation(&cycle)) {
                        cycles.push(cycle);
                    }
                }
            } else if !done.contains(&next) {
                frames.push((next.clone(), neighbors(&next), 0));
                on_path.insert(next.clone());
                path.push(next);
            }
        }
    }

    /// Kahn's algorithm over the acyclic graph, prerequisites first.
    ///
    /// Residual nodes (possible only if a cycle survived upstream repair)
    /// are appended in arbitrary order with a warning rather than failing:
    /// downstream structuring must always receive a complete ordering.
    pub fn topological_order(&self) -> Vec<String> {
        // in-degree in dependency direction: number of unplaced prerequisites
        let mut pending: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (lesson, prereqs) in &self.prerequisites {
            pending.entry(lesson).or_insert(0);
            for p in prereqs {
                *pending.entry(lesson).or_insert(0) += 1;
                dependents.entry(p).or_default().push(lesson);
            }
        }

        let mut queue: VecDeque<&str> = self
            .prerequisites
            .keys()
            .map(|k| k.as_str())
            .filter(|k| pending[k] == 0)
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(self.node_count());
        let mut placed: HashSet<&str> = HashSet::new();

        while let Some(node) = queue.pop_front() {
            if !placed.insert(node) {
                continue;
            }
            order.push(node.to_string());
            for &dep in dependents.get(node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        if order.len() < self.node_count() {
            tracing::warn!(
                placed = order.len(),
                total = self.node_count(),
                "residual nodes after topological sort, appending arbitrarily"
            );
            for node in self.prerequisites.keys() {
                if !placed.contains(node.as_str()) {
                    order.push(node.clone());
                }
            }
        }

        order
    }
}

/// Rotate a closed cycle `[a, b, c, a]` into a canonical open form starting
/// at its smallest node, for deduplication across DFS starts.
fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let open = &cycle[..cycle.len() - 1];
    let min_pos = open
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| n.as_str())
        .map(|(i, _)| i)
        .unwrap_or(0);
    open.iter()
        .cycle()
        .skip(min_pos)
        .take(open.len())
        .cloned()
        .collect()
}
