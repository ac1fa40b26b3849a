//! End-to-end pipeline: raw chunks → objectives → dedup → references →
//! lessons → prerequisite graph → cycle resolution → course tree.
//!
//! Each stage joins completely before the next begins; later stages reason
//! about global invariants and need the full prior result set. Within a
//! stage, independent collaborator calls fan out concurrently under a
//! bounded pool. A hard error anywhere aborts the run; partial results are
//! never returned.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::collaborator::{Collaborator, MergedObjective};
use crate::dedup::{self, SimilarityMatrix};
use crate::error::{SyllabusError, SyllabusResult};
use crate::graph::{build_prerequisite_graph, CycleResolver};
use crate::locate::locate_reference;
use crate::structure::CourseStructurer;
use crate::types::{
    LearningObjective, LessonGroup, Module, ObjectiveWithReference, PipelineConfig, SourceChunk,
};

pub struct Pipeline {
    collaborator: Arc<dyn Collaborator>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(collaborator: Arc<dyn Collaborator>, config: PipelineConfig) -> Self {
        Self {
            collaborator,
            config,
        }
    }

    /// Run the full pipeline for one document.
    pub async fn run(&self, chunks: &[SourceChunk]) -> SyllabusResult<Vec<Module>> {
        validate_input(chunks)?;

        // Block until embedding vectors exist for every involved document.
        let documents: BTreeSet<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();
        for document_id in documents {
            self.collaborator.await_document_vectors(document_id).await?;
        }

        let objectives = self.extract(chunks).await?;
        tracing::debug!(count = objectives.len(), "extracted objectives");
        if objectives.is_empty() {
            return Ok(Vec::new());
        }

        let objectives = self.embed(objectives).await?;
        let merged = self.deduplicate(objectives).await?;
        tracing::debug!(count = merged.len(), "objectives after deduplication");

        let with_references = self.locate_references(merged, chunks);
        let lessons = self.group_lessons(with_references).await?;
        tracing::debug!(count = lessons.len(), "lesson groups formed");

        let graph = build_prerequisite_graph(
            Arc::clone(&self.collaborator),
            &lessons,
            self.config.max_prerequisites,
            self.config.concurrency,
        )
        .await?;

        let resolver = CycleResolver::new(self.config.cycle_max_iterations);
        let graph = resolver
            .resolve(Arc::clone(&self.collaborator), graph)
            .await?;

        let structurer = CourseStructurer::new(
            self.config.structuring_chunk_size,
            self.config.max_submodule_size,
            self.config.structuring_extra_iterations,
        );
        structurer
            .structure(Arc::clone(&self.collaborator), &graph)
            .await
    }

    /// Per-chunk objective extraction, fanned out.
    async fn extract(&self, chunks: &[SourceChunk]) -> SyllabusResult<Vec<LearningObjective>> {
        let budget = self.config.prompt_token_budget;
        let tasks = chunks.iter().map(|chunk| {
            let collaborator = Arc::clone(&self.collaborator);
            async move {
                let content = clip_to_token_budget(&chunk.content, budget);
                let extracted = collaborator.extract_objectives(content).await?;
                let objectives: Vec<LearningObjective> = extracted
                    .into_iter()
                    .map(|e| {
                        let mut obj = LearningObjective::atomic(e.text, chunk.id.clone());
                        obj.sub_objectives = e.sub_objectives;
                        obj
                    })
                    .collect();
                Ok::<_, SyllabusError>(objectives)
            }
        });

        let results: Vec<SyllabusResult<Vec<LearningObjective>>> = stream::iter(tasks)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut objectives = Vec::new();
        for r in results {
            objectives.extend(r?);
        }
        Ok(objectives)
    }

    /// Batch-embed objective texts.
    async fn embed(
        &self,
        mut objectives: Vec<LearningObjective>,
    ) -> SyllabusResult<Vec<LearningObjective>> {
        let texts: Vec<String> = objectives.iter().map(|o| o.text.clone()).collect();
        let vectors = self.collaborator.embed(&texts).await?;
        if vectors.len() != objectives.len() {
            return Err(SyllabusError::SchemaMismatch {
                context: "embed".into(),
                message: format!(
                    "asked for {} vectors, got {}",
                    objectives.len(),
                    vectors.len()
                ),
            });
        }
        for (obj, vector) in objectives.iter_mut().zip(vectors) {
            obj.embedding = Some(vector);
        }
        Ok(objectives)
    }

    /// Cluster near-duplicates, then merge each multi-member cluster into
    /// representatives via the collaborator. Member ids are conserved: every
    /// input id ends up in exactly one output objective.
    async fn deduplicate(
        &self,
        objectives: Vec<LearningObjective>,
    ) -> SyllabusResult<Vec<(LearningObjective, String)>> {
        let matrix = SimilarityMatrix::build(&objectives);
        let clusters = dedup::cluster(&objectives, &matrix, &self.config.objective_clustering);

        let mut output: Vec<(LearningObjective, String)> = Vec::new();
        for cluster in clusters {
            if cluster.len() == 1 {
                let obj = objectives[cluster[0]].clone();
                let candidate = obj.text.clone();
                output.push((obj, candidate));
                continue;
            }

            let members: Vec<LearningObjective> =
                cluster.iter().map(|&i| objectives[i].clone()).collect();
            let merged = self.collaborator.merge_cluster(&members).await?;
            output.extend(combine_cluster(&members, merged));
        }
        Ok(output)
    }

    /// Align each merged objective's candidate sentence back to the source.
    fn locate_references(
        &self,
        merged: Vec<(LearningObjective, String)>,
        chunks: &[SourceChunk],
    ) -> Vec<ObjectiveWithReference> {
        merged
            .into_iter()
            .map(|(objective, candidate)| {
                let own_chunks: Vec<SourceChunk> = chunks
                    .iter()
                    .filter(|c| objective.source_chunk_ids.contains(&c.id))
                    .cloned()
                    .collect();
                let reference = locate_reference(&candidate, &objective, &own_chunks);
                ObjectiveWithReference {
                    objective,
                    reference,
                }
            })
            .collect()
    }

    /// Cluster objectives into lessons (looser threshold, smaller bound)
    /// and have the collaborator name each one. Lesson names are unique:
    /// collisions get a numeric suffix.
    async fn group_lessons(
        &self,
        objectives: Vec<ObjectiveWithReference>,
    ) -> SyllabusResult<Vec<LessonGroup>> {
        // Re-embed the merged texts: merged representatives are new strings.
        let texts: Vec<String> = objectives.iter().map(|o| o.objective.text.clone()).collect();
        let vectors = self.collaborator.embed(&texts).await?;

        let bare: Vec<LearningObjective> = objectives
            .iter()
            .zip(&vectors)
            .map(|(o, v)| LearningObjective {
                embedding: Some(v.clone()),
                ..o.objective.clone()
            })
            .collect();

        let matrix = SimilarityMatrix::build(&bare);
        let clusters = dedup::cluster(&bare, &matrix, &self.config.lesson_clustering);

        let mut used_names: HashSet<String> = HashSet::new();
        let mut lessons = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let texts: Vec<String> = cluster.iter().map(|&i| bare[i].text.clone()).collect();
            let proposed = self.collaborator.name_lesson(&texts).await?;
            let name = unique_name(proposed, &mut used_names);

            let members: Vec<ObjectiveWithReference> =
                cluster.iter().map(|&i| objectives[i].clone()).collect();
            lessons.push(LessonGroup::new(name, members));
        }
        Ok(lessons)
    }
}

/// Clip text to the per-prompt token budget, estimating 4 chars per token,
/// cutting on a char boundary.
fn clip_to_token_budget(text: &str, token_budget: usize) -> &str {
    let max_bytes = token_budget.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn validate_input(chunks: &[SourceChunk]) -> SyllabusResult<()> {
    if chunks.is_empty() {
        return Err(SyllabusError::InvalidInput("document has no chunks".into()));
    }
    if chunks.iter().all(|c| c.content.trim().is_empty()) {
        return Err(SyllabusError::InvalidInput(
            "document has no non-whitespace content".into(),
        ));
    }
    Ok(())
}

/// Turn a cluster plus its merge response into final objectives, conserving
/// every member id. Indices the response leaves uncovered (or covers out of
/// range) are folded into the first representative; an empty response keeps
/// the cluster's first objective as its own representative.
fn combine_cluster(
    members: &[LearningObjective],
    merged: Vec<MergedObjective>,
) -> Vec<(LearningObjective, String)> {
    if merged.is_empty() {
        tracing::warn!("merge returned no representatives, keeping first objective");
        let mut keeper = members[0].clone();
        for m in &members[1..] {
            keeper.member_ids.extend(m.member_ids.iter().cloned());
            keeper
                .source_chunk_ids
                .extend(m.source_chunk_ids.iter().cloned());
        }
        let candidate = keeper.text.clone();
        return vec![(keeper, candidate)];
    }

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut output: Vec<(LearningObjective, String)> = Vec::new();

    for rep in &merged {
        let mut objective = LearningObjective {
            text: rep.text.clone(),
            source_chunk_ids: BTreeSet::new(),
            member_ids: BTreeSet::new(),
            sub_objectives: rep.sub_objectives.clone(),
            embedding: None,
        };
        for &idx in &rep.covers {
            if idx >= members.len() || !claimed.insert(idx) {
                tracing::warn!(index = idx, "ignoring invalid or repeated cover index");
                continue;
            }
            objective
                .member_ids
                .extend(members[idx].member_ids.iter().cloned());
            objective
                .source_chunk_ids
                .extend(members[idx].source_chunk_ids.iter().cloned());
        }
        output.push((objective, rep.reference_candidate.clone()));
    }

    // Fold anything left unclaimed into the first representative.
    for (idx, member) in members.iter().enumerate() {
        if !claimed.contains(&idx) {
            let first = &mut output[0].0;
            first.member_ids.extend(member.member_ids.iter().cloned());
            first
                .source_chunk_ids
                .extend(member.source_chunk_ids.iter().cloned());
        }
    }

    // A representative that claimed nothing and got no folds carries no
    // member ids; dropping it preserves the conservation invariant.
    let mut result: Vec<(LearningObjective, String)> = output
        .into_iter()
        .filter(|(o, _)| !o.member_ids.is_empty())
        .collect();
    if result.is_empty() {
        // Unreachable unless members itself was empty; keep the contract.
        result = members
            .iter()
            .map(|m| (m.clone(), m.text.clone()))
            .collect();
    }
    result
}

fn unique_name(proposed: String, used: &mut HashSet<String>) -> String {
    if used.insert(proposed.clone()) {
        return proposed;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{proposed} ({n})");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
