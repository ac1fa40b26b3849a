use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyllabusError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Collaborator returned schema-invalid data: {context}, {message}")]
    SchemaMismatch { context: String, message: String },

    #[error("Course structuring exhausted its iteration budget: {remaining} of {total} lessons unassigned after {iterations} iterations")]
    UnassignedLessons {
        remaining: usize,
        total: usize,
        iterations: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type SyllabusResult<T> = Result<T, SyllabusError>;
