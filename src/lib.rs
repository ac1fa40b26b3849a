//! # syllabus-core
//!
//! Turns an unstructured source document into a validated, acyclic
//! prerequisite graph of learning objectives, then packs that graph into a
//! bounded-capacity hierarchical course outline (modules → submodules →
//! ordered lessons).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syllabus_core::collaborator::HttpCollaborator;
//! use syllabus_core::pipeline::Pipeline;
//! use syllabus_core::types::{PipelineConfig, SourceChunk};
//!
//! # async fn run() -> syllabus_core::error::SyllabusResult<()> {
//! let collaborator = Arc::new(HttpCollaborator::new("api-key"));
//! let pipeline = Pipeline::new(collaborator, PipelineConfig::default());
//!
//! let chunks = vec![
//!     SourceChunk::new("chunk-1", "doc-1", "Active transport requires energy..."),
//!     SourceChunk::new("chunk-2", "doc-1", "Osmosis is the diffusion of water..."),
//! ];
//!
//! let modules = pipeline.run(&chunks).await?;
//! for module in &modules {
//!     println!("{}. {}", module.position, module.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Core types: `SourceChunk`, `LearningObjective`, `LessonGroup`, `Module` tree, `PipelineConfig` |
//! | [`collaborator`] | External text/embedding generation: one trait method per prompt type, HTTP client + test stubs |
//! | [`locate`] | Reference-sentence alignment: exact span recovery despite whitespace/punctuation/Unicode noise |
//! | [`dedup`] | Similarity clustering over union-find with work-list threshold refinement |
//! | [`graph`] | Prerequisite graph, DFS cycle enumeration, LLM-ranked cycle resolution |
//! | [`structure`] | Topological ordering, chunked LLM-assisted bin-packing, deterministic capacity enforcement |
//! | [`pipeline`] | End-to-end orchestration with bounded fan-out per stage |
//! | [`error`] | Error types with thiserror: InvalidInput, Collaborator, SchemaMismatch, UnassignedLessons |
//!
//! ## Guarantees
//!
//! - No objective member id is ever lost or duplicated by deduplication
//! - A reference marked exact is a byte-for-byte substring of its chunk
//! - The resolved prerequisite graph has no self-loops and no cycles, and
//!   removed edges are always a subset of proposed edges
//! - Every lesson appears exactly once in the final tree, every submodule
//!   holds at most the configured capacity, and sibling positions are dense
//!   1..N sequences
//!
//! Cycles, oversized clusters, and capacity overflow are expected
//! variability, corrected algorithmically and logged. Hard errors are
//! reserved for invalid input and lessons left unassigned after the
//! structuring iteration budget.

pub mod collaborator;
pub mod dedup;
pub mod error;
pub mod graph;
pub mod locate;
pub mod pipeline;
pub mod structure;
pub mod types;

pub use error::{SyllabusError, SyllabusResult};
pub use types::*;
