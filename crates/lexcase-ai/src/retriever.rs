//! Precedent retrieval and composite scoring.
//!
//! Retrieval is two-phase: a cosine search over an oversampled candidate pool,
//! then a re-rank of that pool by the composite score
//!
//! ```text
//! w1·similarity + w2·recency + w3·court_weight + w4·issue_overlap + feedback_boost
//! ```
//!
//! with every component but the boost bounded to `[0, 1]` (similarity to
//! `[-1, 1]`). The stored boost is clamped to `±boost_bound` and counted in
//! similarity units, so `feedback_boost = w1·boost` and a boost alone never
//! lifts a document over one more than `boost_bound` more similar.

use std::collections::BTreeSet;
use std::sync::Arc;

use lexcase_core::{
    ConfigError, Document, IssueTag, Query, RetrievalConfig, RetrievalError, ScoredPrecedent,
};
use lexcase_store::FeedbackStore;
use tracing::{debug, info};

use crate::embed::Embed;
use crate::index::VectorIndex;
use crate::issues::IssueSpotter;

pub struct PrecedentRetriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embed>,
    feedback: Arc<FeedbackStore>,
    spotter: IssueSpotter,
    config: RetrievalConfig,
}

impl PrecedentRetriever {
    /// Validates the configuration and that the embedder matches the index.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embed>,
        feedback: Arc<FeedbackStore>,
        config: RetrievalConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if embedder.dim() != index.dim() {
            return Err(ConfigError::Other(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dim(),
                index.dim()
            )));
        }
        Ok(Self {
            index,
            embedder,
            feedback,
            spotter: IssueSpotter,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    /// Top `k` precedents for the query, with issues spotted from the query.
    pub fn retrieve(&self, query: &Query, k: usize) -> Result<Vec<ScoredPrecedent>, RetrievalError> {
        let issues = self.spotter.spot(query);
        self.retrieve_with_issues(query, &issues, k)
    }

    /// Top `k` precedents for the query, scoring issue overlap against `issues`.
    pub fn retrieve_with_issues(
        &self,
        query: &Query,
        issues: &BTreeSet<IssueTag>,
        k: usize,
    ) -> Result<Vec<ScoredPrecedent>, RetrievalError> {
        if k == 0 || self.index.is_empty() {
            return Ok(vec![]);
        }

        let query_vector = self.embedder.embed(&query.text())?;
        let pool = k.saturating_mul(self.config.oversample);
        let hits = self.index.search(&query_vector, pool)?;

        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            let document = self.index.document(hit.index).ok_or_else(|| {
                RetrievalError::Index(format!("hit row {} out of range", hit.index))
            })?;
            let precedent = self.score(document, hit.similarity, issues);
            debug!(
                id = %precedent.document.id,
                similarity = precedent.similarity,
                composite = precedent.composite_score,
                "scored candidate"
            );
            scored.push(precedent);
        }

        scored.sort_by(ScoredPrecedent::ranking_cmp);
        scored.truncate(k);
        info!(
            k,
            candidates = pool.min(self.index.len()),
            returned = scored.len(),
            issues = issues.len(),
            "retrieved precedents"
        );
        Ok(scored)
    }

    /// Composite score of one document given its similarity to the query.
    pub fn score(
        &self,
        document: &Document,
        similarity: f32,
        issues: &BTreeSet<IssueTag>,
    ) -> ScoredPrecedent {
        let recency = self.config.recency(document.year);
        let court_weight = document.court_weight();
        let issue_overlap = issue_overlap(issues, &document.tags);
        let feedback_boost = self.config.weights.similarity
            * self.config.clamp_boost(self.feedback.get_boost(&document.id));
        let composite_score = self
            .config
            .weights
            .combine(similarity, recency, court_weight, issue_overlap)
            + feedback_boost;

        ScoredPrecedent {
            document: document.clone(),
            similarity,
            recency,
            court_weight,
            issue_overlap,
            feedback_boost,
            composite_score,
        }
    }
}

/// Share of the document's tags raised by the query, in `[0, 1]`.
pub fn issue_overlap(query_issues: &BTreeSet<IssueTag>, doc_tags: &BTreeSet<IssueTag>) -> f32 {
    let shared = query_issues.intersection(doc_tags).count();
    shared as f32 / doc_tags.len().max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashingEmbedder;
    use lexcase_core::{Court, EmbeddingError, ScoreWeights};

    fn doc(title: &str, year: i32, court: Court, tags: &[IssueTag], text: &str) -> Document {
        Document {
            id: lexcase_core::document_id(title, year),
            title: title.into(),
            year,
            court,
            tags: tags.iter().copied().collect(),
            text: text.into(),
            level_weight: None,
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            current_year: Some(2025),
            ..Default::default()
        }
    }

    /// Four-dimensional fixture with hand-placed vectors.
    fn fixture(feedback: Arc<FeedbackStore>) -> PrecedentRetriever {
        let docs = vec![
            doc("Alpha", 2020, Court::Supreme, &[IssueTag::Privacy], ""),
            doc("Beta", 2020, Court::Supreme, &[IssueTag::Privacy], ""),
            doc("Gamma", 2000, Court::High, &[IssueTag::Trade], ""),
        ];
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ];
        let index = Arc::new(VectorIndex::from_vectors(docs, vectors, 4).unwrap());
        PrecedentRetriever::new(index, Arc::new(FixedEmbedder), feedback, config()).unwrap()
    }

    /// Embeds every text to the first axis.
    struct FixedEmbedder;

    impl Embed for FixedEmbedder {
        fn dim(&self) -> usize {
            4
        }
        fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
    }

    struct BrokenEmbedder;

    impl Embed for BrokenEmbedder {
        fn dim(&self) -> usize {
            4
        }
        fn embed(&self, _: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![f32::NAN; 4])
        }
    }

    #[test]
    fn empty_corpus_returns_empty() {
        let retriever = PrecedentRetriever::new(
            Arc::new(VectorIndex::empty(4)),
            Arc::new(FixedEmbedder),
            Arc::new(FeedbackStore::in_memory()),
            config(),
        )
        .unwrap();
        assert!(retriever.retrieve(&Query::new("t", "f"), 5).unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_config_and_dimension() {
        let index = Arc::new(VectorIndex::empty(8));
        let feedback = Arc::new(FeedbackStore::in_memory());
        let bad = RetrievalConfig {
            weights: ScoreWeights {
                similarity: 0.9,
                ..Default::default()
            },
            ..config()
        };
        assert!(matches!(
            PrecedentRetriever::new(index.clone(), Arc::new(FixedEmbedder), feedback.clone(), bad),
            Err(ConfigError::WeightSum(_))
        ));
        assert!(matches!(
            PrecedentRetriever::new(index, Arc::new(FixedEmbedder), feedback, config()),
            Err(ConfigError::Other(_))
        ));
    }

    #[test]
    fn embedding_failure_surfaces_as_retrieval_error() {
        let index = Arc::new(
            VectorIndex::from_vectors(
                vec![doc("Alpha", 2020, Court::Supreme, &[], "")],
                vec![vec![1.0, 0.0, 0.0, 0.0]],
                4,
            )
            .unwrap(),
        );
        let retriever = PrecedentRetriever::new(
            index,
            Arc::new(BrokenEmbedder),
            Arc::new(FeedbackStore::in_memory()),
            config(),
        )
        .unwrap();
        assert!(matches!(
            retriever.retrieve(&Query::new("t", "f"), 1),
            Err(RetrievalError::Embedding(EmbeddingError::NonFinite { .. }))
        ));
    }

    #[test]
    fn ranks_by_composite_and_truncates() {
        let retriever = fixture(Arc::new(FeedbackStore::in_memory()));
        let issues = BTreeSet::from([IssueTag::Privacy]);
        let results = retriever
            .retrieve_with_issues(&Query::new("privacy", ""), &issues, 2)
            .unwrap();
        let titles: Vec<&str> = results.iter().map(|r| r.document.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
        assert_eq!(results[0].issue_overlap, 1.0);
        assert!((results[0].recency - 0.75).abs() < 1e-6);
        assert!(results.windows(2).all(|w| w[0].composite_score >= w[1].composite_score));
    }

    #[test]
    fn composite_is_monotonic_in_each_component() {
        let retriever = fixture(Arc::new(FeedbackStore::in_memory()));
        let issues = BTreeSet::from([IssueTag::Privacy]);
        let base = doc("Base", 2010, Court::High, &[IssueTag::Trade], "");
        let s = retriever.score(&base, 0.5, &issues).composite_score;

        assert!(retriever.score(&base, 0.6, &issues).composite_score >= s);

        let newer = Document { year: 2015, ..base.clone() };
        assert!(retriever.score(&newer, 0.5, &issues).composite_score >= s);

        let higher = Document { court: Court::Supreme, ..base.clone() };
        assert!(retriever.score(&higher, 0.5, &issues).composite_score >= s);

        let tagged = Document {
            tags: BTreeSet::from([IssueTag::Privacy]),
            ..base.clone()
        };
        assert!(retriever.score(&tagged, 0.5, &issues).composite_score >= s);
    }

    #[test]
    fn feedback_reorders_close_documents() {
        let feedback = Arc::new(FeedbackStore::in_memory());
        let beta = lexcase_core::document_id("Beta", 2020);
        feedback.record(&beta, 0.2, None).unwrap();
        let retriever = fixture(feedback);
        let results = retriever.retrieve(&Query::new("x", ""), 3).unwrap();
        assert_eq!(results[0].document.title, "Beta");
        let w1 = retriever.config().weights.similarity;
        assert!((results[0].feedback_boost - 0.2 * w1).abs() < 1e-6);
    }

    #[test]
    fn full_boost_cannot_overturn_gap_wider_than_bound() {
        let feedback = Arc::new(FeedbackStore::in_memory());
        let retriever = fixture(feedback.clone());
        let bound = retriever.config().boost_bound;
        assert_eq!(retriever.config().boost_dominance_gap(), bound);
        let high = doc("Same", 2020, Court::Supreme, &[], "");
        let low = Document {
            id: "boosted".into(),
            ..high.clone()
        };
        feedback.record("boosted", 1.0, None).unwrap();
        let issues = BTreeSet::new();

        // 0.80 vs 0.50 under the default weights, boost on the weaker one.
        let sh = retriever.score(&high, 0.80, &issues);
        let sl = retriever.score(&low, 0.50, &issues);
        assert!(sh.composite_score > sl.composite_score);

        let sh = retriever.score(&high, 0.50 + bound + 0.01, &issues);
        assert!(sh.composite_score > sl.composite_score);

        // Inside the bound the same boost does reorder.
        let sh = retriever.score(&high, 0.50 + bound - 0.01, &issues);
        assert!(sh.composite_score < sl.composite_score);
    }

    #[test]
    fn ordering_is_deterministic() {
        let retriever = fixture(Arc::new(FeedbackStore::in_memory()));
        let q = Query::new("privacy", "data");
        let first = retriever.retrieve(&q, 3).unwrap();
        for _ in 0..3 {
            assert_eq!(retriever.retrieve(&q, 3).unwrap(), first);
        }
    }

    #[test]
    fn hashing_retrieval_surfaces_matching_text() {
        let docs = vec![
            doc("Shutdown ruling", 2020, Court::Supreme, &[IssueTag::Internet], "internet shutdown suspension"),
            doc("Tax ruling", 2020, Court::Supreme, &[IssueTag::Trade], "income tax assessment"),
        ];
        let embedder = Arc::new(HashingEmbedder::new(128));
        let index = Arc::new(VectorIndex::build(docs, embedder.as_ref()).unwrap());
        let retriever =
            PrecedentRetriever::new(index, embedder, Arc::new(FeedbackStore::in_memory()), config())
                .unwrap();
        let results = retriever
            .retrieve(&Query::new("Internet shutdown", "suspension of internet"), 1)
            .unwrap();
        assert_eq!(results[0].document.title, "Shutdown ruling");
    }

    #[test]
    fn overlap_divides_by_document_tags() {
        let q = BTreeSet::from([IssueTag::Privacy, IssueTag::Internet]);
        let d = BTreeSet::from([IssueTag::Internet, IssueTag::Trade]);
        assert_eq!(issue_overlap(&q, &d), 0.5);
        assert_eq!(issue_overlap(&q, &BTreeSet::new()), 0.0);
    }
}
