//! Cycle detection and removal.
//!
//! Iterative state machine: strip self-loops, enumerate cycles, merge
//! overlapping cycles into conflict groups, have the collaborator rank each
//! group, drop back-edges against the ranking, repeat. If the iteration
//! ceiling is reached with cycles still present, an arbitrary fallback
//! deletes the first edge of each remaining cycle — lossy but terminating,
//! logged as degraded rather than raised.
//!
//! Expected variability (cycles existing at all) is never an error; the only
//! error path is a collaborator failure or a ranking that violates its
//! contract.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::collaborator::Collaborator;
use crate::error::{SyllabusError, SyllabusResult};

use super::PrerequisiteGraph;

pub struct CycleResolver {
    max_iterations: usize,
}

impl CycleResolver {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Repair `graph` into an acyclic one. Nodes are never dropped and no
    /// edge is ever invented; the output edge set is a subset of the input.
    pub async fn resolve(
        &self,
        collaborator: Arc<dyn Collaborator>,
        mut graph: PrerequisiteGraph,
    ) -> SyllabusResult<PrerequisiteGraph> {
        let stripped = graph.strip_self_loops();
        if stripped > 0 {
            tracing::debug!(count = stripped, "stripped self-loops");
        }

        for iteration in 0..self.max_iterations {
            let cycles = graph.find_cycles();
            if cycles.is_empty() {
                return Ok(graph);
            }

            tracing::debug!(
                iteration,
                cycles = cycles.len(),
                "resolving prerequisite cycles"
            );

            for group in conflict_groups(&cycles) {
                let names: Vec<String> = group.iter().cloned().collect();
                let ranking = collaborator.rank_cycle_group(&names).await?;
                let rank = validate_ranking(&names, &ranking)?;
                apply_ranking(&mut graph, &rank);
            }

            // Postcondition guard for this pass
            graph.strip_self_loops();
        }

        let remaining = graph.find_cycles();
        if !remaining.is_empty() {
            tracing::warn!(
                cycles = remaining.len(),
                "iteration budget exhausted, falling back to arbitrary edge deletion"
            );
            // Delete the edge from each cycle's first listed node to its
            // second, re-enumerating until none remain. Lossy by design.
            loop {
                let cycles = graph.find_cycles();
                if cycles.is_empty() {
                    break;
                }
                for cycle in &cycles {
                    if cycle.len() >= 2 {
                        graph.remove_edge(&cycle[0], &cycle[1]);
                    }
                }
            }
        }

        debug_assert!(!graph.has_cycles());
        Ok(graph)
    }
}

/// Partition cycle participants into maximal connected groups: two cycles
/// sharing any node belong to the same group.
fn conflict_groups(cycles: &[Vec<String>]) -> Vec<BTreeSet<String>> {
    let mut groups: Vec<BTreeSet<String>> = Vec::new();

    for cycle in cycles {
        let members: BTreeSet<String> = cycle.iter().cloned().collect();
        let (overlapping, disjoint): (Vec<BTreeSet<String>>, Vec<BTreeSet<String>>) = groups
            .into_iter()
            .partition(|g| !g.is_disjoint(&members));

        let mut merged = members;
        for g in overlapping {
            merged.extend(g);
        }
        groups = disjoint;
        groups.push(merged);
    }

    groups.sort_by(|a, b| a.iter().next().cmp(&b.iter().next()));
    groups
}

/// Check that `ranking` is a strict total order over exactly `names`:
/// no additions, omissions, or renames.
fn validate_ranking(
    names: &[String],
    ranking: &[String],
) -> SyllabusResult<HashMap<String, usize>> {
    let expected: BTreeSet<&String> = names.iter().collect();
    let returned: BTreeSet<&String> = ranking.iter().collect();

    if ranking.len() != names.len() || expected != returned {
        return Err(SyllabusError::SchemaMismatch {
            context: "rank_cycle_group".into(),
            message: format!(
                "expected a permutation of {} names, got [{}]",
                names.len(),
                ranking.join(", ")
            ),
        });
    }

    Ok(ranking
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect())
}

/// Keep only prerequisite edges pointing to strictly lower-ranked (more
/// fundamental) nodes; edges to unranked nodes are untouched.
fn apply_ranking(graph: &mut PrerequisiteGraph, rank: &HashMap<String, usize>) {
    let mut doomed: Vec<(String, String)> = Vec::new();
    for (lesson, prereq) in graph.edges() {
        if let (Some(&lesson_rank), Some(&prereq_rank)) = (rank.get(lesson), rank.get(prereq)) {
            if prereq_rank >= lesson_rank {
                doomed.push((lesson.clone(), prereq.clone()));
            }
        }
    }
    for (lesson, prereq) in doomed {
        graph.remove_edge(&lesson, &prereq);
    }
}
