//! Hierarchical, capacity-constrained course structuring.
//!
//! Takes the acyclic lesson graph and packs it into modules → submodules →
//! ordered lessons. Assignment itself is LLM-assisted bin-packing over
//! fixed-size chunks of the topological order; everything after that is
//! deterministic: empty containers are stripped, siblings are re-sorted by
//! minimum topological index, oversized submodules are split without any
//! collaborator call, and positions are renumbered to dense 1..N sequences.
//!
//! The one hard error in this stage: lessons still unassigned after the
//! iteration budget. Silently dropping a lesson is never acceptable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::collaborator::{Collaborator, SubmoduleSlot};
use crate::error::{SyllabusError, SyllabusResult};
use crate::graph::PrerequisiteGraph;
use crate::types::{Lesson, Module, SubModule};

pub struct CourseStructurer {
    chunk_size: usize,
    max_submodule_size: usize,
    extra_iterations: usize,
}

/// Running assignment state during chunked structuring
#[derive(Default)]
struct WorkingStructure {
    /// submodule → lessons, in placement order
    submodule_lessons: BTreeMap<String, Vec<String>>,
    /// submodule → module
    submodule_module: BTreeMap<String, String>,
    /// lesson → submodule, the dedup authority: a placed lesson never moves
    placed: HashMap<String, String>,
}

impl WorkingStructure {
    fn place_lesson(&mut self, lesson: &str, submodule: &str) {
        if self.placed.contains_key(lesson) {
            return;
        }
        self.placed.insert(lesson.to_string(), submodule.to_string());
        self.submodule_lessons
            .entry(submodule.to_string())
            .or_default()
            .push(lesson.to_string());
    }

    fn link_submodule(&mut self, submodule: &str, module: &str) {
        self.submodule_module
            .entry(submodule.to_string())
            .or_insert_with(|| module.to_string());
    }

    fn slots(&self, capacity: usize) -> Vec<SubmoduleSlot> {
        self.submodule_lessons
            .iter()
            .map(|(name, lessons)| SubmoduleSlot {
                name: name.clone(),
                module: self.submodule_module.get(name).cloned(),
                remaining_capacity: capacity.saturating_sub(lessons.len()),
            })
            .collect()
    }
}

impl CourseStructurer {
    pub fn new(chunk_size: usize, max_submodule_size: usize, extra_iterations: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_submodule_size: max_submodule_size.max(1),
            extra_iterations,
        }
    }

    /// Structure the lessons of an acyclic prerequisite graph into a module
    /// tree. Every node of the graph appears exactly once in the output.
    pub async fn structure(
        &self,
        collaborator: Arc<dyn Collaborator>,
        graph: &PrerequisiteGraph,
    ) -> SyllabusResult<Vec<Module>> {
        let order = graph.topological_order();
        if order.is_empty() {
            return Ok(Vec::new());
        }
        let topo_index: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let working = self.assign_chunked(&collaborator, &order).await?;
        let working = self.attach_orphans(&collaborator, working).await?;

        let mut modules = self.materialize(working, &topo_index);
        self.enforce_capacity(&mut modules);
        renumber(&mut modules);
        Ok(modules)
    }

    /// Step B: chunked, iterative LLM-assisted assignment.
    async fn assign_chunked(
        &self,
        collaborator: &Arc<dyn Collaborator>,
        order: &[String],
    ) -> SyllabusResult<WorkingStructure> {
        let total = order.len();
        let known: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let budget = total.div_ceil(self.chunk_size) + self.extra_iterations;

        let mut working = WorkingStructure::default();
        let mut iterations = 0;

        while working.placed.len() < total && iterations < budget {
            iterations += 1;

            let chunk: Vec<String> = order
                .iter()
                .filter(|l| !working.placed.contains_key(l.as_str()))
                .take(self.chunk_size)
                .cloned()
                .collect();

            let slots = working.slots(self.max_submodule_size);
            let round = collaborator.assign_lessons(&chunk, &slots).await?;

            for assignment in &round.lessons {
                if !known.contains(assignment.lesson.as_str()) {
                    tracing::warn!(lesson = %assignment.lesson, "ignoring assignment for unknown lesson");
                    continue;
                }
                working.place_lesson(&assignment.lesson, &assignment.submodule);
            }
            for link in &round.submodules {
                working.link_submodule(&link.submodule, &link.module);
            }
        }

        if working.placed.len() < total {
            return Err(SyllabusError::UnassignedLessons {
                remaining: total - working.placed.len(),
                total,
                iterations,
            });
        }

        Ok(working)
    }

    /// Step C: attach submodules that never got a module, one batched call.
    async fn attach_orphans(
        &self,
        collaborator: &Arc<dyn Collaborator>,
        mut working: WorkingStructure,
    ) -> SyllabusResult<WorkingStructure> {
        let orphans: Vec<String> = working
            .submodule_lessons
            .keys()
            .filter(|s| !working.submodule_module.contains_key(*s))
            .cloned()
            .collect();
        if orphans.is_empty() {
            return Ok(working);
        }

        let modules: Vec<String> = {
            let seen: HashSet<&String> = working.submodule_module.values().collect();
            let mut list: Vec<String> = seen.into_iter().cloned().collect();
            list.sort();
            list
        };

        let links = collaborator.attach_submodules(&orphans, &modules).await?;
        for link in links {
            working.link_submodule(&link.submodule, &link.module);
        }

        // A submodule the response skipped still has to live somewhere.
        for orphan in orphans {
            if !working.submodule_module.contains_key(&orphan) {
                tracing::warn!(submodule = %orphan, "orphan submodule left unattached, promoting to its own module");
                let module = orphan.clone();
                working.link_submodule(&orphan, &module);
            }
        }
        Ok(working)
    }

    /// Step D: build the tree, strip empty containers, sort siblings by
    /// minimum topological index, order lessons topologically.
    fn materialize(
        &self,
        working: WorkingStructure,
        topo_index: &HashMap<&str, usize>,
    ) -> Vec<Module> {
        let mut by_module: BTreeMap<String, Vec<SubModule>> = BTreeMap::new();

        for (sub_name, mut lessons) in working.submodule_lessons {
            if lessons.is_empty() {
                tracing::warn!(submodule = %sub_name, "stripping empty submodule");
                continue;
            }
            lessons.sort_by_key(|l| topo_index.get(l.as_str()).copied().unwrap_or(usize::MAX));

            let module_name = working
                .submodule_module
                .get(&sub_name)
                .cloned()
                .unwrap_or_else(|| sub_name.clone());

            let submodule = SubModule {
                name: sub_name,
                position: 0,
                lessons: lessons
                    .into_iter()
                    .map(|name| {
                        let topological_index =
                            topo_index.get(name.as_str()).copied().unwrap_or(usize::MAX);
                        Lesson {
                            name,
                            position: 0,
                            topological_index,
                        }
                    })
                    .collect(),
            };
            by_module.entry(module_name).or_default().push(submodule);
        }

        let mut modules: Vec<Module> = by_module
            .into_iter()
            .filter_map(|(name, mut submodules)| {
                if submodules.is_empty() {
                    tracing::warn!(module = %name, "stripping empty module");
                    return None;
                }
                submodules.sort_by_key(|s| s.min_topological_index());
                Some(Module {
                    name,
                    position: 0,
                    submodules,
                })
            })
            .collect();

        modules.sort_by_key(|m| m.min_topological_index());
        modules
    }

    /// Step E: split oversized submodules into contiguous, size-balanced
    /// parts in place. No collaborator call; relative lesson order is kept,
    /// and the parts occupy the original submodule's slot.
    fn enforce_capacity(&self, modules: &mut Vec<Module>) {
        for module in modules {
            let mut rebuilt: Vec<SubModule> = Vec::with_capacity(module.submodules.len());
            for submodule in module.submodules.drain(..) {
                if submodule.lessons.len() <= self.max_submodule_size {
                    rebuilt.push(submodule);
                    continue;
                }
                rebuilt.extend(split_submodule(submodule, self.max_submodule_size));
            }
            module.submodules = rebuilt;
        }
    }
}

/// Split one oversized submodule into `ceil(n / cap)` contiguous parts whose
/// sizes differ by at most one.
fn split_submodule(submodule: SubModule, cap: usize) -> Vec<SubModule> {
    let n = submodule.lessons.len();
    let parts = n.div_ceil(cap);
    let base = n / parts;
    let remainder = n % parts;

    tracing::debug!(
        submodule = %submodule.name,
        lessons = n,
        parts,
        "splitting oversized submodule"
    );

    let mut lessons = submodule.lessons.into_iter();
    (0..parts)
        .map(|i| {
            let size = base + usize::from(i < remainder);
            SubModule {
                name: format!("{} ({}/{})", submodule.name, i + 1, parts),
                position: 0,
                lessons: lessons.by_ref().take(size).collect(),
            }
        })
        .collect()
}

/// Renumber positions to dense 1..N sequences at every level.
fn renumber(modules: &mut [Module]) {
    for (mi, module) in modules.iter_mut().enumerate() {
        module.position = mi as u32 + 1;
        for (si, submodule) in module.submodules.iter_mut().enumerate() {
            submodule.position = si as u32 + 1;
            for (li, lesson) in submodule.lessons.iter_mut().enumerate() {
                lesson.position = li as u32 + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{
        AssignmentRound, ExtractedObjective, LessonAssignment, MergedObjective,
        SubmoduleAssignment,
    };
    use crate::types::LearningObjective;

    /// Packs lessons into submodules round-robin by declared capacity, and
    /// every submodule into one module. Deterministic bin-packer stand-in.
    struct PackingCollaborator {
        per_submodule: usize,
        /// When true, never assign anything (drives the hard-error path)
        refuse: bool,
        /// When true, skip orphan attachment responses
        skip_orphans: bool,
    }

    impl PackingCollaborator {
        fn new(per_submodule: usize) -> Self {
            Self {
                per_submodule,
                refuse: false,
                skip_orphans: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl Collaborator for PackingCollaborator {
        async fn extract_objectives(
            &self,
            _c: &str,
        ) -> SyllabusResult<Vec<ExtractedObjective>> {
            unimplemented!()
        }

        async fn merge_cluster(
            &self,
            _c: &[LearningObjective],
        ) -> SyllabusResult<Vec<MergedObjective>> {
            unimplemented!()
        }

        async fn name_lesson(&self, _o: &[String]) -> SyllabusResult<String> {
            unimplemented!()
        }

        async fn propose_prerequisites(
            &self,
            _l: &str,
            _o: &[String],
            _k: &[String],
            _m: usize,
        ) -> SyllabusResult<Vec<String>> {
            unimplemented!()
        }

        async fn rank_cycle_group(&self, _n: &[String]) -> SyllabusResult<Vec<String>> {
            unimplemented!()
        }

        async fn assign_lessons(
            &self,
            lesson_names: &[String],
            slots: &[SubmoduleSlot],
        ) -> SyllabusResult<AssignmentRound> {
            if self.refuse {
                return Ok(AssignmentRound::default());
            }
            let start = slots.len();
            let lessons = lesson_names
                .iter()
                .enumerate()
                .map(|(i, l)| LessonAssignment {
                    lesson: l.clone(),
                    submodule: format!("Unit {}", start + i / self.per_submodule + 1),
                })
                .collect();
            Ok(AssignmentRound {
                lessons,
                submodules: vec![],
            })
        }

        async fn attach_submodules(
            &self,
            orphan_submodules: &[String],
            _module_names: &[String],
        ) -> SyllabusResult<Vec<SubmoduleAssignment>> {
            if self.skip_orphans {
                return Ok(vec![]);
            }
            Ok(orphan_submodules
                .iter()
                .map(|s| SubmoduleAssignment {
                    submodule: s.clone(),
                    module: "Course Module".into(),
                })
                .collect())
        }

        async fn embed(&self, _t: &[String]) -> SyllabusResult<Vec<Vec<f32>>> {
            unimplemented!()
        }
    }

    fn chain_graph(n: usize) -> PrerequisiteGraph {
        // lesson-(i+1) requires lesson-i
        let mut g = PrerequisiteGraph::new();
        g.add_node("lesson-01");
        for i in 1..n {
            g.add_edge(format!("lesson-{:02}", i + 1), format!("lesson-{:02}", i));
        }
        g
    }

    fn assert_invariants(modules: &[Module], expected_lessons: usize, cap: usize) {
        let mut seen: Vec<&str> = Vec::new();
        for (mi, module) in modules.iter().enumerate() {
            assert_eq!(module.position, mi as u32 + 1);
            assert!(!module.submodules.is_empty());
            for (si, sub) in module.submodules.iter().enumerate() {
                assert_eq!(sub.position, si as u32 + 1);
                assert!(!sub.lessons.is_empty());
                assert!(sub.lessons.len() <= cap);
                for (li, lesson) in sub.lessons.iter().enumerate() {
                    assert_eq!(lesson.position, li as u32 + 1);
                    seen.push(&lesson.name);
                }
            }
        }
        let unique: HashSet<&&str> = seen.iter().collect();
        assert_eq!(seen.len(), expected_lessons);
        assert_eq!(unique.len(), expected_lessons);
    }

    // Scenario: 10 lessons, chunk size 3, capacity 7
    #[tokio::test]
    async fn ten_lessons_chunked_into_bounded_submodules() {
        let graph = chain_graph(10);
        let structurer = CourseStructurer::new(3, 7, 5);
        let modules = structurer
            .structure(Arc::new(PackingCollaborator::new(4)), &graph)
            .await
            .unwrap();

        assert_invariants(&modules, 10, 7);
        let submodule_count: usize = modules.iter().map(|m| m.submodules.len()).sum();
        assert!(submodule_count >= 2);
    }

    #[tokio::test]
    async fn oversized_submodule_split_preserving_order() {
        // One submodule takes all 10 lessons, then must split at cap 7
        let graph = chain_graph(10);
        let structurer = CourseStructurer::new(20, 7, 5);
        let modules = structurer
            .structure(Arc::new(PackingCollaborator::new(100)), &graph)
            .await
            .unwrap();

        assert_invariants(&modules, 10, 7);

        // Relative topological order preserved across the split parts
        let flat: Vec<usize> = modules
            .iter()
            .flat_map(|m| &m.submodules)
            .flat_map(|s| &s.lessons)
            .map(|l| l.topological_index)
            .collect();
        let mut sorted = flat.clone();
        sorted.sort_unstable();
        assert_eq!(flat, sorted);

        // Contiguous size-balanced split: 10 → 5 + 5
        let sizes: Vec<usize> = modules
            .iter()
            .flat_map(|m| &m.submodules)
            .map(|s| s.lessons.len())
            .collect();
        assert_eq!(sizes, vec![5, 5]);
    }

    #[tokio::test]
    async fn refusing_collaborator_exhausts_budget() {
        let graph = chain_graph(4);
        let structurer = CourseStructurer::new(2, 7, 1);
        let err = structurer
            .structure(
                Arc::new(PackingCollaborator {
                    per_submodule: 2,
                    refuse: true,
                    skip_orphans: false,
                }),
                &graph,
            )
            .await
            .unwrap_err();

        match err {
            SyllabusError::UnassignedLessons {
                remaining, total, ..
            } => {
                assert_eq!(remaining, 4);
                assert_eq!(total, 4);
            }
            other => panic!("expected UnassignedLessons, got {other}"),
        }
    }

    #[tokio::test]
    async fn skipped_orphans_promoted_to_own_module() {
        let graph = chain_graph(3);
        let structurer = CourseStructurer::new(10, 7, 5);
        let modules = structurer
            .structure(
                Arc::new(PackingCollaborator {
                    per_submodule: 2,
                    refuse: false,
                    skip_orphans: true,
                }),
                &graph,
            )
            .await
            .unwrap();

        // Lessons survive even though no orphan attachment came back
        assert_invariants(&modules, 3, 7);
    }

    #[tokio::test]
    async fn empty_graph_structures_to_nothing() {
        let graph = PrerequisiteGraph::new();
        let structurer = CourseStructurer::new(20, 7, 5);
        let modules = structurer
            .structure(Arc::new(PackingCollaborator::new(4)), &graph)
            .await
            .unwrap();
        assert!(modules.is_empty());
    }

    #[tokio::test]
    async fn siblings_ordered_by_min_topological_index() {
        let graph = chain_graph(8);
        let structurer = CourseStructurer::new(4, 7, 5);
        let modules = structurer
            .structure(Arc::new(PackingCollaborator::new(3)), &graph)
            .await
            .unwrap();

        for module in &modules {
            let mins: Vec<usize> = module
                .submodules
                .iter()
                .map(|s| s.min_topological_index())
                .collect();
            let mut sorted = mins.clone();
            sorted.sort_unstable();
            assert_eq!(mins, sorted);
        }
        let module_mins: Vec<usize> = modules.iter().map(|m| m.min_topological_index()).collect();
        let mut sorted = module_mins.clone();
        sorted.sort_unstable();
        assert_eq!(module_mins, sorted);
    }

    #[test]
    fn split_sizes_balanced() {
        let sub = SubModule {
            name: "Big".into(),
            position: 1,
            lessons: (0..16)
                .map(|i| Lesson {
                    name: format!("l{i}"),
                    position: 0,
                    topological_index: i,
                })
                .collect(),
        };
        let parts = split_submodule(sub, 7);
        let sizes: Vec<usize> = parts.iter().map(|p| p.lessons.len()).collect();
        assert_eq!(sizes, vec![6, 5, 5]);
        assert!(parts[0].name.contains("1/3"));
    }
}
