//! In-memory precedent vector index.
//!
//! Embeddings are kept in one Arrow `FixedSizeList<Float32, dim>` column so
//! the index can be exported as a record batch matching
//! [`precedent_index_schema`]. Rows are L2-normalized at insertion, so cosine
//! similarity against a normalized query is a dot product.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, FixedSizeListBuilder, Float32Array, Float32Builder,
    Int32Builder, ListBuilder, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use lexcase_core::{Document, EmbeddingError, precedent_index_schema};
use tracing::{debug, info};

use crate::embed::{Embed, dot, normalize, validate};

/// One nearest-neighbour hit: the document's row and its cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub index: usize,
    pub similarity: f32,
}

/// Immutable after construction; share it behind an `Arc`.
pub struct VectorIndex {
    documents: Vec<Document>,
    embeddings: FixedSizeListArray,
    dim: usize,
}

impl VectorIndex {
    /// Embed every document's title and text and index the results.
    pub fn build(documents: Vec<Document>, embedder: &dyn Embed) -> Result<Self, EmbeddingError> {
        let texts: Vec<String> = documents
            .iter()
            .map(|d| format!("{}. {}", d.title, d.text))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&refs)?;
        let index = Self::from_vectors(documents, vectors, embedder.dim())?;
        info!(documents = index.len(), dim = index.dim, "built precedent index");
        Ok(index)
    }

    /// Index precomputed vectors, one per document in the same order.
    ///
    /// Every vector is validated (dimension, finiteness) and normalized.
    pub fn from_vectors(
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
        dim: usize,
    ) -> Result<Self, EmbeddingError> {
        if documents.len() != vectors.len() {
            return Err(EmbeddingError::Backend(format!(
                "{} documents but {} embeddings",
                documents.len(),
                vectors.len()
            )));
        }
        let mut builder =
            FixedSizeListBuilder::new(Float32Builder::with_capacity(dim * vectors.len()), dim as i32);
        for mut v in vectors {
            validate(&v, dim)?;
            normalize(&mut v);
            builder.values().append_slice(&v);
            builder.append(true);
        }
        Ok(Self {
            documents,
            embeddings: builder.finish(),
            dim,
        })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            documents: Vec::new(),
            embeddings: FixedSizeListBuilder::new(Float32Builder::new(), dim as i32).finish(),
            dim,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn document(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    fn flat_values(&self) -> &[f32] {
        // FixedSizeListBuilder<Float32Builder> always yields Float32 values.
        self.embeddings
            .values()
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.values().as_ref())
            .unwrap_or(&[])
    }

    /// The `k` rows most similar to `query`, similarity descending.
    ///
    /// `k` larger than the index is clamped; `k == 0` or an empty index gives
    /// no hits. Equal similarities keep row order. Returned similarities lie
    /// in `[-1, 1]`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, EmbeddingError> {
        validate(query, self.dim)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let mut q = query.to_vec();
        normalize(&mut q);

        let flat = self.flat_values();
        let mut hits: Vec<Hit> = flat
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(index, row)| Hit {
                index,
                similarity: dot(&q, row).clamp(-1.0, 1.0),
            })
            .collect();

        // Stable sort keeps ascending row order among ties.
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        debug!(k, best = hits[0].similarity, "vector search");
        Ok(hits)
    }

    /// Export the index as a record batch with [`precedent_index_schema`].
    pub fn to_record_batch(&self) -> Result<RecordBatch, arrow::error::ArrowError> {
        let n = self.len();
        let mut ids = StringBuilder::with_capacity(n, n * 24);
        let mut titles = StringBuilder::with_capacity(n, n * 48);
        let mut years = Int32Builder::with_capacity(n);
        let mut courts = StringBuilder::with_capacity(n, n * 8);
        let mut tags = ListBuilder::new(StringBuilder::new());
        let mut texts = StringBuilder::new();

        for doc in &self.documents {
            ids.append_value(&doc.id);
            titles.append_value(&doc.title);
            years.append_value(doc.year);
            courts.append_value(doc.court.as_str());
            for tag in &doc.tags {
                tags.values().append_value(tag.as_str());
            }
            tags.append(true);
            texts.append_value(&doc.text);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(ids.finish()),
            Arc::new(titles.finish()),
            Arc::new(years.finish()),
            Arc::new(courts.finish()),
            Arc::new(tags.finish()),
            Arc::new(texts.finish()),
            Arc::new(self.embeddings.clone()),
        ];
        RecordBatch::try_new(Arc::new(precedent_index_schema(self.dim)), columns)
    }
}
