use thiserror::Error;

/// A vector from the embedding boundary that cannot be indexed or searched.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding has dimension {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },

    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Failure while retrieving precedents for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(String),
}
