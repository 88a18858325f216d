//! Storage layer: JSON corpus records and the persistent feedback store.

mod error;
pub use error::StoreError;

pub mod corpus;
pub mod feedback;

pub use corpus::{load_corpus, parse_corpus};
pub use feedback::{FeedbackStore, StyleFlags};
