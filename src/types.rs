use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ─── Input Boundary ─────────────────────────────────────────────────────────

/// Identifier of a source document chunk
pub type ChunkId = String;

/// A chunk of the source document, as handed in by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChunk {
    pub id: ChunkId,
    pub document_id: String,
    pub content: String,
}

impl SourceChunk {
    pub fn new(
        id: impl Into<ChunkId>,
        document_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            content: content.into(),
        }
    }
}

// ─── Objectives ─────────────────────────────────────────────────────────────

/// An atomic statement of what a learner should be able to do.
///
/// `member_ids` are the atomic identities merged into this objective by
/// deduplication. Every member id maps to exactly one live objective:
/// merging moves ids, it never drops or duplicates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningObjective {
    pub text: String,
    pub source_chunk_ids: BTreeSet<ChunkId>,
    pub member_ids: BTreeSet<String>,
    pub sub_objectives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl LearningObjective {
    /// Create a fresh atomic objective with a single minted member id.
    pub fn atomic(text: impl Into<String>, source_chunk_id: impl Into<ChunkId>) -> Self {
        Self {
            text: text.into(),
            source_chunk_ids: [source_chunk_id.into()].into_iter().collect(),
            member_ids: [uuid::Uuid::new_v4().to_string()].into_iter().collect(),
            sub_objectives: Vec::new(),
            embedding: None,
        }
    }

    /// First known source chunk, used when a reference sentence cannot be
    /// located and must be attributed somewhere.
    pub fn first_chunk_id(&self) -> Option<&ChunkId> {
        self.source_chunk_ids.iter().next()
    }
}

/// A sentence from the source document that grounds an objective.
///
/// When `is_exact_match` is true, `text` is a byte-for-byte substring of the
/// attributed chunk's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSentence {
    pub text: String,
    pub is_exact_match: bool,
    pub source_chunk_id: ChunkId,
    pub source_document_id: String,
}

/// An objective paired with its located reference sentence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveWithReference {
    pub objective: LearningObjective,
    pub reference: ReferenceSentence,
}

// ─── Lessons ────────────────────────────────────────────────────────────────

/// A cluster of objectives taught together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonGroup {
    pub name: String,
    pub objectives: Vec<ObjectiveWithReference>,
    pub chunk_ids: BTreeSet<ChunkId>,
    pub expected_duration_minutes: u32,
}

impl LessonGroup {
    pub fn new(name: impl Into<String>, objectives: Vec<ObjectiveWithReference>) -> Self {
        let chunk_ids: BTreeSet<ChunkId> = objectives
            .iter()
            .flat_map(|o| o.objective.source_chunk_ids.iter().cloned())
            .collect();
        let expected_duration_minutes =
            expected_duration_minutes(objectives.len(), chunk_ids.len());
        Self {
            name: name.into(),
            objectives,
            chunk_ids,
            expected_duration_minutes,
        }
    }
}

/// Deterministic lesson duration from objective count and distinct-chunk
/// count, bounded to [2, 45] minutes. The model's own estimate is never
/// trusted for this.
pub fn expected_duration_minutes(objective_count: usize, chunk_count: usize) -> u32 {
    let raw = 4 * objective_count as u32 + 2 * chunk_count as u32;
    raw.clamp(2, 45)
}

// ─── Course Tree ────────────────────────────────────────────────────────────

/// A lesson placed in the final course tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub name: String,
    /// Dense 1..N position among siblings
    pub position: u32,
    /// Index in the topological order of the prerequisite graph
    pub topological_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubModule {
    pub name: String,
    pub position: u32,
    pub lessons: Vec<Lesson>,
}

impl SubModule {
    /// Minimum topological index among contained lessons
    pub fn min_topological_index(&self) -> usize {
        self.lessons
            .iter()
            .map(|l| l.topological_index)
            .min()
            .unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub position: u32,
    pub submodules: Vec<SubModule>,
}

impl Module {
    pub fn min_topological_index(&self) -> usize {
        self.submodules
            .iter()
            .map(|s| s.min_topological_index())
            .min()
            .unwrap_or(usize::MAX)
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Parameters for one clustering run (objective dedup and lesson grouping
/// use the same machinery with different settings)
#[derive(Debug, Clone, Copy)]
pub struct ClusteringParams {
    /// Cosine similarity at or above which two items merge
    pub threshold: f32,
    /// Clusters larger than this are refined with a tightened threshold
    pub max_cluster_size: usize,
    /// Added to the threshold on each refinement pass
    pub threshold_increment: f32,
    /// Refinement stops here; oversized clusters are then accepted
    pub max_threshold: f32,
}

/// Pipeline configuration. All pure constants, no environment coupling.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub objective_clustering: ClusteringParams,
    pub lesson_clustering: ClusteringParams,
    /// Token budget per collaborator prompt
    pub prompt_token_budget: usize,
    /// Lessons per chunk during course structuring
    pub structuring_chunk_size: usize,
    /// Hard cap on lessons per submodule
    pub max_submodule_size: usize,
    /// Cap on prerequisites requested per lesson
    pub max_prerequisites: usize,
    /// Cycle-resolution iteration ceiling
    pub cycle_max_iterations: usize,
    /// Extra structuring iterations beyond ceil(total / chunk_size)
    pub structuring_extra_iterations: usize,
    /// Bounded fan-out width for concurrent collaborator calls
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            objective_clustering: ClusteringParams {
                threshold: 0.6,
                max_cluster_size: 20,
                threshold_increment: 0.05,
                max_threshold: 1.0,
            },
            lesson_clustering: ClusteringParams {
                threshold: 0.4,
                max_cluster_size: 5,
                threshold_increment: 0.02,
                max_threshold: 1.0,
            },
            prompt_token_budget: 100_000,
            structuring_chunk_size: 20,
            max_submodule_size: 7,
            max_prerequisites: 8,
            cycle_max_iterations: 5,
            structuring_extra_iterations: 5,
            concurrency: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_objective_has_one_member() {
        let obj = LearningObjective::atomic("Explain osmosis", "chunk-1");
        assert_eq!(obj.member_ids.len(), 1);
        assert_eq!(obj.source_chunk_ids.len(), 1);
        assert_eq!(obj.first_chunk_id().unwrap(), "chunk-1");
    }

    #[test]
    fn atomic_objectives_get_distinct_members() {
        let a = LearningObjective::atomic("A", "c1");
        let b = LearningObjective::atomic("A", "c1");
        assert_ne!(a.member_ids, b.member_ids);
    }

    #[test]
    fn duration_is_clamped() {
        assert_eq!(expected_duration_minutes(0, 0), 2);
        assert_eq!(expected_duration_minutes(1, 1), 6);
        assert_eq!(expected_duration_minutes(100, 50), 45);
    }

    #[test]
    fn lesson_group_collects_chunk_ids() {
        let obj = |chunk: &str| ObjectiveWithReference {
            objective: LearningObjective::atomic("x", chunk),
            reference: ReferenceSentence {
                text: "x".into(),
                is_exact_match: false,
                source_chunk_id: chunk.into(),
                source_document_id: "doc".into(),
            },
        };
        let lesson = LessonGroup::new("Cells", vec![obj("c1"), obj("c2"), obj("c1")]);
        assert_eq!(lesson.chunk_ids.len(), 2);
        assert_eq!(lesson.expected_duration_minutes, 4 * 3 + 2 * 2);
    }

    #[test]
    fn min_topological_index_over_tree() {
        let sub = SubModule {
            name: "s".into(),
            position: 1,
            lessons: vec![
                Lesson {
                    name: "a".into(),
                    position: 1,
                    topological_index: 4,
                },
                Lesson {
                    name: "b".into(),
                    position: 2,
                    topological_index: 2,
                },
            ],
        };
        assert_eq!(sub.min_topological_index(), 2);

        let module = Module {
            name: "m".into(),
            position: 1,
            submodules: vec![sub],
        };
        assert_eq!(module.min_topological_index(), 2);
    }

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.objective_clustering.threshold, 0.6);
        assert_eq!(config.lesson_clustering.max_cluster_size, 5);
        assert_eq!(config.max_submodule_size, 7);
        assert_eq!(config.cycle_max_iterations, 5);
    }
}
