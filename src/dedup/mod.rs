//! Similarity-based objective deduplication.
//!
//! Near-duplicate learning objectives are clustered by embedding cosine
//! similarity over a union-find of their atomic member ids. Clusters larger
//! than the configured bound are refined on a work-list with a tightened
//! threshold until they fit or the threshold ceiling is reached — oversized
//! clusters at the ceiling are accepted as-is, which is an escape valve
//! rather than a failure.
//!
//! The same machinery runs twice in the pipeline: once to deduplicate
//! objectives and once (looser threshold, smaller bound) to group them into
//! lessons.

mod union_find;

use std::collections::VecDeque;

pub use union_find::UnionFind;

use crate::types::{ClusteringParams, LearningObjective};

/// An embedding vector with cached magnitude
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub magnitude: f32,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        Self { vector, magnitude }
    }

    /// Cosine similarity between two embeddings
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.magnitude == 0.0 || other.magnitude == 0.0 {
            return 0.0;
        }
        let dot: f32 = self
            .vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| a * b)
            .sum();
        dot / (self.magnitude * other.magnitude)
    }
}

/// Pairwise cosine similarities, indexed by input position
pub struct SimilarityMatrix {
    values: Vec<Vec<f32>>,
}

impl SimilarityMatrix {
    /// Build from the objectives' embedding vectors. Objectives without a
    /// vector score 0.0 against everything.
    pub fn build(objectives: &[LearningObjective]) -> Self {
        let embeddings: Vec<Option<Embedding>> = objectives
            .iter()
            .map(|o| o.embedding.clone().map(Embedding::new))
            .collect();

        let n = objectives.len();
        let mut values = vec![vec![0.0f32; n]; n];
        for i in 0..n {
            values[i][i] = 1.0;
            for j in i + 1..n {
                let sim = match (&embeddings[i], &embeddings[j]) {
                    (Some(a), Some(b)) => a.cosine_similarity(b),
                    _ => 0.0,
                };
                values[i][j] = sim;
                values[j][i] = sim;
            }
        }
        Self { values }
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i][j]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Partition objectives into clusters of near-duplicates.
///
/// Returns index sets into `objectives`; every index appears in exactly one
/// cluster. Clusters are ordered by their smallest member index.
pub fn cluster(
    objectives: &[LearningObjective],
    matrix: &SimilarityMatrix,
    params: &ClusteringParams,
) -> Vec<Vec<usize>> {
    if objectives.is_empty() {
        return Vec::new();
    }

    // Work-list of (member indices, threshold) rather than recursion, so the
    // termination ceiling is a visible loop guard.
    let mut queue: VecDeque<(Vec<usize>, f32)> = VecDeque::new();
    queue.push_back(((0..objectives.len()).collect(), params.threshold));

    let mut done: Vec<Vec<usize>> = Vec::new();

    while let Some((indices, threshold)) = queue.pop_front() {
        let clusters = cluster_once(objectives, matrix, &indices, threshold);
        for c in clusters {
            if c.len() > params.max_cluster_size && threshold < params.max_threshold {
                let next = (threshold + params.threshold_increment).min(params.max_threshold);
                queue.push_back((c, next));
            } else {
                if c.len() > params.max_cluster_size {
                    tracing::warn!(
                        size = c.len(),
                        max = params.max_cluster_size,
                        "accepting oversized cluster at threshold ceiling"
                    );
                }
                done.push(c);
            }
        }
    }

    done.sort_by_key(|c| c.iter().copied().min().unwrap_or(usize::MAX));
    done
}

/// One union-find pass over a subset of objectives at a fixed threshold.
fn cluster_once(
    objectives: &[LearningObjective],
    matrix: &SimilarityMatrix,
    indices: &[usize],
    threshold: f32,
) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new();

    // An objective's own member ids always belong together.
    for &i in indices {
        let mut members = objectives[i].member_ids.iter();
        if let Some(first) = members.next() {
            uf.insert(first);
            for m in members {
                uf.union(first, m);
            }
        }
    }

    for (pos, &i) in indices.iter().enumerate() {
        for &j in &indices[pos + 1..] {
            if matrix.get(i, j) >= threshold {
                let a = objectives[i].member_ids.iter().next();
                let b = objectives[j].member_ids.iter().next();
                if let (Some(a), Some(b)) = (a, b) {
                    uf.union(a, b);
                }
            }
        }
    }

    // Materialize equivalence classes; each objective contributes once.
    let mut by_root: std::collections::HashMap<String, Vec<usize>> =
        std::collections::HashMap::new();
    for &i in indices {
        if let Some(first) = objectives[i].member_ids.iter().next() {
            let root = uf.find(first);
            by_root.entry(root).or_default().push(i);
        }
    }

    let mut clusters: Vec<Vec<usize>> = by_root.into_values().collect();
    clusters.sort_by_key(|c| c.iter().copied().min().unwrap_or(usize::MAX));
    clusters
}
