use serde::{Deserialize, Serialize};

use crate::error::SyllabusResult;
use crate::types::LearningObjective;

/// An objective proposed by the collaborator for a single source chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedObjective {
    pub text: String,
    #[serde(default)]
    pub sub_objectives: Vec<String>,
}

/// A representative objective produced for one dedup cluster.
///
/// `covers` lists indices into the cluster that this representative absorbs.
/// Indices a merge response leaves uncovered are folded into the first
/// representative so no member id is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedObjective {
    pub text: String,
    #[serde(default)]
    pub sub_objectives: Vec<String>,
    pub covers: Vec<usize>,
    /// Candidate reference sentence, to be aligned against source chunks
    pub reference_candidate: String,
}

/// A submodule slot offered to the assignment prompt, with how many more
/// lessons it can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleSlot {
    pub name: String,
    pub module: Option<String>,
    pub remaining_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonAssignment {
    pub lesson: String,
    pub submodule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleAssignment {
    pub submodule: String,
    pub module: String,
}

/// One round of structuring assignments returned by the collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRound {
    #[serde(default)]
    pub lessons: Vec<LessonAssignment>,
    #[serde(default)]
    pub submodules: Vec<SubmoduleAssignment>,
}

/// External text/embedding generation collaborator.
///
/// One method per prompt type, each a fallible RPC with a declared output
/// shape. Backed by a real client in production and a deterministic stub in
/// tests. Failures propagate to the caller of the current pipeline stage;
/// retry policy is not this crate's concern.
#[async_trait::async_trait]
pub trait Collaborator: Send + Sync {
    /// Propose learning objectives for one source chunk.
    async fn extract_objectives(
        &self,
        chunk_content: &str,
    ) -> SyllabusResult<Vec<ExtractedObjective>>;

    /// Merge a cluster of near-duplicate objectives into zero or more
    /// representatives, each with a candidate reference sentence.
    async fn merge_cluster(
        &self,
        cluster: &[LearningObjective],
    ) -> SyllabusResult<Vec<MergedObjective>>;

    /// Name a lesson given the texts of its member objectives.
    async fn name_lesson(&self, objective_texts: &[String]) -> SyllabusResult<String>;

    /// Propose prerequisites for one lesson, drawn from `known_names`.
    async fn propose_prerequisites(
        &self,
        lesson_name: &str,
        objective_texts: &[String],
        known_names: &[String],
        max: usize,
    ) -> SyllabusResult<Vec<String>>;

    /// Produce a strict total order over exactly the given node names, most
    /// fundamental first. Additions, omissions, or renames violate the
    /// contract and are rejected by the caller.
    async fn rank_cycle_group(&self, names: &[String]) -> SyllabusResult<Vec<String>>;

    /// Assign a chunk of lessons to submodules (existing or new) and
    /// submodules to modules, given the current partial structure.
    async fn assign_lessons(
        &self,
        lesson_names: &[String],
        slots: &[SubmoduleSlot],
    ) -> SyllabusResult<AssignmentRound>;

    /// Attach orphan submodules to existing or new modules, one batched call.
    async fn attach_submodules(
        &self,
        orphan_submodules: &[String],
        module_names: &[String],
    ) -> SyllabusResult<Vec<SubmoduleAssignment>>;

    /// Embed input strings, one vector per string, same order.
    async fn embed(&self, texts: &[String]) -> SyllabusResult<Vec<Vec<f32>>>;

    /// Block until embedding vectors exist for a document. In-process
    /// collaborators are ready immediately.
    async fn await_document_vectors(&self, _document_id: &str) -> SyllabusResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety check
    #[test]
    fn collaborator_is_object_safe() {
        fn _assert_object_safe(_: &dyn Collaborator) {}
    }

    #[test]
    fn assignment_round_deserializes_with_defaults() {
        let round: AssignmentRound = serde_json::from_str("{}").unwrap();
        assert!(round.lessons.is_empty());
        assert!(round.submodules.is_empty());

        let round: AssignmentRound = serde_json::from_str(
            r#"{"lessons":[{"lesson":"Osmosis","submodule":"Transport"}]}"#,
        )
        .unwrap();
        assert_eq!(round.lessons[0].submodule, "Transport");
    }

    #[test]
    fn merged_objective_deserializes() {
        let merged: MergedObjective = serde_json::from_str(
            r#"{"text":"Explain diffusion","covers":[0,2],"reference_candidate":"Diffusion moves solutes."}"#,
        )
        .unwrap();
        assert_eq!(merged.covers, vec![0, 2]);
        assert!(merged.sub_objectives.is_empty());
    }
}
