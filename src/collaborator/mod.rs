//! External text/embedding generation collaborator.
//!
//! Every "ask the model" step in the pipeline is a fallible RPC with a
//! declared output shape, one trait method per prompt type. Production uses
//! [`HttpCollaborator`]; tests use deterministic stubs.

mod http;
mod traits;

pub use http::HttpCollaborator;
pub use traits::*;
