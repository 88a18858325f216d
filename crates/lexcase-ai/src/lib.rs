//! AI layer: embeddings, the precedent vector index and retriever, keyword
//! issue spotting, and the LLM completion boundary.

pub mod embed;
pub mod index;
pub mod issues;
pub mod llm;
pub mod retriever;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

pub use embed::{Embed, HashingEmbedder};
pub use index::{Hit, VectorIndex};
pub use issues::IssueSpotter;
pub use llm::{
    BackendError, ChatClient, ChunkSink, CompletionBackend, CompletionRequest, NullSink,
    ResponseMode,
};
pub use retriever::PrecedentRetriever;
