//! Retrieval scoring configuration.
//!
//! Weights and the recency horizon are policy, not algorithm: every value here
//! can be overridden from the command line or environment and is validated
//! once at startup.

use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("weight {name} is {value}, must be finite and non-negative")]
    InvalidWeight { name: &'static str, value: f32 },

    #[error("weights sum to {0}, must sum to 1")]
    WeightSum(f32),

    #[error("expected 4 comma-separated weights, got {0:?}")]
    WeightFormat(String),

    #[error("default retrieval k must be at least 1")]
    ZeroTopK,

    #[error("oversample factor must be at least 1")]
    ZeroOversample,

    #[error("feedback boost bound {0} must be in (0, 0.5]")]
    BoostBound(f32),

    #[error("recency horizon must be at least 1 year")]
    RecencyHorizon,

    #[error("{0}")]
    Other(String),
}

/// Linear weights of the composite precedent score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub similarity: f32,
    pub recency: f32,
    pub court: f32,
    pub issue_overlap: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            similarity: 0.55,
            recency: 0.15,
            court: 0.2,
            issue_overlap: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("similarity", self.similarity),
            ("recency", self.recency),
            ("court", self.court),
            ("issue_overlap", self.issue_overlap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(())
    }

    pub fn sum(&self) -> f32 {
        self.similarity + self.recency + self.court + self.issue_overlap
    }

    /// Weighted sum of the four bounded components (feedback excluded).
    pub fn combine(&self, similarity: f32, recency: f32, court: f32, issue_overlap: f32) -> f32 {
        self.similarity * similarity
            + self.recency * recency
            + self.court * court
            + self.issue_overlap * issue_overlap
    }
}

impl FromStr for ScoreWeights {
    type Err = ConfigError;

    /// Parse `"similarity,recency,court,issue_overlap"`, e.g. `"0.55,0.15,0.2,0.1"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f32> = s
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConfigError::WeightFormat(s.to_string()))?;
        let [similarity, recency, court, issue_overlap] = parts[..] else {
            return Err(ConfigError::WeightFormat(s.to_string()));
        };
        let weights = Self {
            similarity,
            recency,
            court,
            issue_overlap,
        };
        weights.validate()?;
        Ok(weights)
    }
}

/// Everything the precedent retriever needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub weights: ScoreWeights,
    /// Default number of precedents returned per query.
    pub top_k: usize,
    /// Candidate pool multiplier for re-ranking (`oversample * k`).
    pub oversample: usize,
    /// Absolute bound on any single document's feedback boost.
    pub boost_bound: f32,
    /// Age in years at which recency reaches zero.
    pub recency_horizon_years: u32,
    /// Reference year for recency; `None` means the current calendar year.
    pub current_year: Option<i32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            top_k: 5,
            oversample: 3,
            boost_bound: 0.2,
            recency_horizon_years: 20,
            current_year: None,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if self.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.oversample == 0 {
            return Err(ConfigError::ZeroOversample);
        }
        if !(self.boost_bound > 0.0 && self.boost_bound <= 0.5) {
            return Err(ConfigError::BoostBound(self.boost_bound));
        }
        if self.recency_horizon_years == 0 {
            return Err(ConfigError::RecencyHorizon);
        }
        Ok(())
    }

    pub fn reference_year(&self) -> i32 {
        self.current_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    /// Recency in `[0, 1]`: 1 for this year, falling linearly to 0 at the horizon.
    /// Future-dated documents count as current.
    pub fn recency(&self, year: i32) -> f32 {
        let age = (self.reference_year() - year).max(0) as f32;
        (1.0 - age / self.recency_horizon_years as f32).max(0.0)
    }

    pub fn clamp_boost(&self, boost: f32) -> f32 {
        if boost.is_finite() {
            boost.clamp(-self.boost_bound, self.boost_bound)
        } else {
            0.0
        }
    }

    /// Similarity gap beyond which one document's boost alone can never lift
    /// it over an otherwise-identical document. Boosts count in similarity
    /// units, so this is the bound itself.
    pub fn boost_dominance_gap(&self) -> f32 {
        self.boost_bound
    }
}
