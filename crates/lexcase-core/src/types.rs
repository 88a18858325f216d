//! Shared precedent, query and feedback types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::IssueTag;

/// Court rank of a precedent. Higher courts carry more weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Court {
    Supreme,
    High,
    Tribunal,
    District,
    Other,
}

impl Court {
    /// Parse a free-form court name such as "Supreme Court of India".
    ///
    /// Matches on keywords, so "Delhi High Court" and "high" both yield
    /// [`Court::High`]. Anything unrecognised is [`Court::Other`].
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("supreme") {
            Self::Supreme
        } else if lower.contains("high") {
            Self::High
        } else if lower.contains("tribunal") || lower.contains("commission") {
            Self::Tribunal
        } else if lower.contains("district") || lower.contains("sessions") {
            Self::District
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supreme => "supreme",
            Self::High => "high",
            Self::Tribunal => "tribunal",
            Self::District => "district",
            Self::Other => "other",
        }
    }

    /// Default rank weight in `[0, 1]`, Supreme highest.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Supreme => 1.0,
            Self::High => 0.7,
            Self::Tribunal => 0.5,
            Self::District => 0.4,
            Self::Other => 0.3,
        }
    }
}

impl fmt::Display for Court {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Supreme => "Supreme Court",
            Self::High => "High Court",
            Self::Tribunal => "Tribunal",
            Self::District => "District Court",
            Self::Other => "Other",
        })
    }
}

/// A precedent in the corpus.
///
/// The embedding lives in the owning `VectorIndex` row, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub court: Court,
    pub tags: BTreeSet<IssueTag>,
    pub text: String,
    /// Overrides [`Court::weight`] when the corpus supplies its own rank weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_weight: Option<f32>,
}

impl Document {
    pub fn court_weight(&self) -> f32 {
        self.level_weight
            .map(|w| w.clamp(0.0, 1.0))
            .unwrap_or_else(|| self.court.weight())
    }

    /// Citation form used in prompts and grounding: `Title (Year)`.
    pub fn citation(&self) -> String {
        format!("{} ({})", self.title, self.year)
    }
}

/// A case query submitted for analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub title: String,
    pub facts: String,
    #[serde(default)]
    pub issue_hints: BTreeSet<IssueTag>,
}

impl Query {
    pub fn new(title: impl Into<String>, facts: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            facts: facts.into(),
            issue_hints: BTreeSet::new(),
        }
    }

    pub fn with_hints(mut self, hints: impl IntoIterator<Item = IssueTag>) -> Self {
        self.issue_hints.extend(hints);
        self
    }

    /// Title and facts joined the way they are embedded and matched.
    pub fn text(&self) -> String {
        match (self.title.trim(), self.facts.trim()) {
            ("", facts) => facts.to_string(),
            (title, "") => title.to_string(),
            (title, facts) => format!("{title}. {facts}"),
        }
    }
}

/// A ranking nudge recorded against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub document_id: String,
    pub boost: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A retrieved precedent with every scoring component kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrecedent {
    pub document: Document,
    pub similarity: f32,
    pub recency: f32,
    pub court_weight: f32,
    pub issue_overlap: f32,
    pub feedback_boost: f32,
    pub composite_score: f32,
}

impl ScoredPrecedent {
    /// Deterministic ranking order: composite score descending, then year
    /// descending, then title ascending.
    pub fn ranking_cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .composite_score
            .total_cmp(&self.composite_score)
            .then_with(|| other.document.year.cmp(&self.document.year))
            .then_with(|| self.document.title.cmp(&other.document.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, year: i32) -> Document {
        Document {
            id: title.to_lowercase(),
            title: title.into(),
            year,
            court: Court::Supreme,
            tags: BTreeSet::new(),
            text: String::new(),
            level_weight: None,
        }
    }

    fn scored(title: &str, year: i32, composite: f32) -> ScoredPrecedent {
        ScoredPrecedent {
            document: doc(title, year),
            similarity: 0.0,
            recency: 0.0,
            court_weight: 0.0,
            issue_overlap: 0.0,
            feedback_boost: 0.0,
            composite_score: composite,
        }
    }

    #[test]
    fn court_from_name_matches_keywords() {
        assert_eq!(Court::from_name("Supreme Court of India"), Court::Supreme);
        assert_eq!(Court::from_name("Delhi High Court"), Court::High);
        assert_eq!(Court::from_name("National Green Tribunal"), Court::Tribunal);
        assert_eq!(Court::from_name("District Court, Pune"), Court::District);
        assert_eq!(Court::from_name("Privy Council"), Court::Other);
    }

    #[test]
    fn court_weights_rank_supreme_highest() {
        let weights: Vec<f32> = [Court::Supreme, Court::High, Court::Tribunal, Court::District, Court::Other]
            .iter()
            .map(Court::weight)
            .collect();
        assert!(weights.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn level_weight_overrides_court_table() {
        let mut d = doc("A", 2020);
        assert_eq!(d.court_weight(), 1.0);
        d.level_weight = Some(0.25);
        assert_eq!(d.court_weight(), 0.25);
    }

    #[test]
    fn query_text_joins_title_and_facts() {
        let q = Query::new("Title", "Facts here.");
        assert_eq!(q.text(), "Title. Facts here.");
        assert_eq!(Query::new("", "only facts").text(), "only facts");
        assert_eq!(Query::new("only title", "  ").text(), "only title");
    }

    #[test]
    fn ranking_breaks_ties_by_year_then_title() {
        let mut items = vec![
            scored("Beta", 2017, 0.5),
            scored("Alpha", 2017, 0.5),
            scored("Gamma", 2023, 0.5),
            scored("Delta", 2001, 0.9),
        ];
        items.sort_by(ScoredPrecedent::ranking_cmp);
        let titles: Vec<&str> = items.iter().map(|s| s.document.title.as_str()).collect();
        assert_eq!(titles, vec!["Delta", "Gamma", "Alpha", "Beta"]);
    }

    #[test]
    fn feedback_entry_json_roundtrip() {
        let entry = FeedbackEntry {
            document_id: "puttaswamy-2017".into(),
            boost: 0.04,
            style_notes: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("style_notes"));
        let parsed: FeedbackEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
