//! Raw prerequisite graph construction.
//!
//! One collaborator query per lesson, fanned out concurrently under a
//! bounded pool and joined before the resolver runs. Proposed names that
//! match no known lesson are dropped (the graph never gains invented node
//! identities), but no other validation happens here: self-loops and cycles
//! are the resolver's job.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::collaborator::Collaborator;
use crate::error::SyllabusResult;
use crate::types::LessonGroup;

use super::PrerequisiteGraph;

pub async fn build_prerequisite_graph(
    collaborator: Arc<dyn Collaborator>,
    lessons: &[LessonGroup],
    max_prerequisites: usize,
    concurrency: usize,
) -> SyllabusResult<PrerequisiteGraph> {
    let all_names: Vec<String> = lessons.iter().map(|l| l.name.clone()).collect();
    let known: HashSet<String> = all_names.iter().cloned().collect();

    let queries = lessons.iter().map(|lesson| {
        let collaborator = Arc::clone(&collaborator);
        let others: Vec<String> = all_names
            .iter()
            .filter(|n| **n != lesson.name)
            .cloned()
            .collect();
        let objective_texts: Vec<String> = lesson
            .objectives
            .iter()
            .map(|o| o.objective.text.clone())
            .collect();
        let name = lesson.name.clone();
        async move {
            let proposed = collaborator
                .propose_prerequisites(&name, &objective_texts, &others, max_prerequisites)
                .await?;
            Ok::<_, crate::error::SyllabusError>((name, proposed))
        }
    });

    let results: Vec<SyllabusResult<(String, Vec<String>)>> = stream::iter(queries)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut graph = PrerequisiteGraph::new();
    for name in &all_names {
        graph.add_node(name.clone());
    }
    for result in results {
        let (lesson, proposed) = result?;
        for prereq in proposed.into_iter().take(max_prerequisites) {
            if known.contains(&prereq) {
                graph.add_edge(lesson.clone(), prereq);
            } else {
                tracing::warn!(lesson = %lesson, name = %prereq, "dropping invented prerequisite name");
            }
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{
        AssignmentRound, ExtractedObjective, MergedObjective, SubmoduleAssignment, SubmoduleSlot,
    };
    use crate::types::{LearningObjective, ObjectiveWithReference, ReferenceSentence};

    struct ScriptedPrereqs;

    #[async_trait::async_trait]
    impl Collaborator for ScriptedPrereqs {
        async fn extract_objectives(
            &self,
            _chunk_content: &str,
        ) -> SyllabusResult<Vec<ExtractedObjective>> {
            unimplemented!()
        }

        async fn merge_cluster(
            &self,
            _cluster: &[LearningObjective],
        ) -> SyllabusResult<Vec<MergedObjective>> {
            unimplemented!()
        }

        async fn name_lesson(&self, _objective_texts: &[String]) -> SyllabusResult<String> {
            unimplemented!()
        }

        async fn propose_prerequisites(
            &self,
            lesson_name: &str,
            _objective_texts: &[String],
            _known_names: &[String],
            _max: usize,
        ) -> SyllabusResult<Vec<String>> {
            Ok(match lesson_name {
                "Advanced" => vec!["Basics".into(), "Invented Lesson".into()],
                "Basics" => vec![],
                _ => vec![],
            })
        }

        async fn rank_cycle_group(&self, _names: &[String]) -> SyllabusResult<Vec<String>> {
            unimplemented!()
        }

        async fn assign_lessons(
            &self,
            _lesson_names: &[String],
            _slots: &[SubmoduleSlot],
        ) -> SyllabusResult<AssignmentRound> {
            unimplemented!()
        }

        async fn attach_submodules(
            &self,
            _orphan_submodules: &[String],
            _module_names: &[String],
        ) -> SyllabusResult<Vec<SubmoduleAssignment>> {
            unimplemented!()
        }

        async fn embed(&self, _texts: &[String]) -> SyllabusResult<Vec<Vec<f32>>> {
            unimplemented!()
        }
    }

    fn lesson(name: &str) -> LessonGroup {
        let objective = LearningObjective::atomic(format!("{name} objective"), "c1");
        LessonGroup::new(
            name,
            vec![ObjectiveWithReference {
                reference: ReferenceSentence {
                    text: objective.text.clone(),
                    is_exact_match: false,
                    source_chunk_id: "c1".into(),
                    source_document_id: "d1".into(),
                },
                objective,
            }],
        )
    }

    #[tokio::test]
    async fn builds_graph_and_drops_invented_names() {
        let lessons = vec![lesson("Basics"), lesson("Advanced")];
        let graph = build_prerequisite_graph(Arc::new(ScriptedPrereqs), &lessons, 8, 4)
            .await
            .unwrap();

        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_edge("Advanced", "Basics"));
        assert!(!graph.nodes().any(|n| n == "Invented Lesson"));
        assert_eq!(graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn every_lesson_becomes_a_node_even_without_edges() {
        let lessons = vec![lesson("Basics")];
        let graph = build_prerequisite_graph(Arc::new(ScriptedPrereqs), &lessons, 8, 1)
            .await
            .unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }
}
