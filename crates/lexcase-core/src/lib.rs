pub mod config;
pub mod doc_id;
pub mod error;
pub mod issue;
pub mod schema;
pub mod types;

pub use config::{ConfigError, RetrievalConfig, ScoreWeights};
pub use doc_id::document_id;
pub use error::{EmbeddingError, RetrievalError};
pub use issue::IssueTag;
pub use schema::precedent_index_schema;
pub use types::{Court, Document, FeedbackEntry, Query, ScoredPrecedent};
