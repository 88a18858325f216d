//! Controlled vocabulary of legal issue tags.
//!
//! The declaration order of [`IssueTag`] is the canonical vocabulary order.
//! Sets of tags are kept in `BTreeSet`s so iteration always follows it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A legal concern a query or precedent can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueTag {
    Legality,
    Privacy,
    Proportionality,
    Biometrics,
    Safeguards,
    Expression,
    Religion,
    Equality,
    Trade,
    Assembly,
    Internet,
    Localization,
    Surveillance,
}

impl IssueTag {
    /// Every tag, in vocabulary order.
    pub const ALL: [IssueTag; 13] = [
        IssueTag::Legality,
        IssueTag::Privacy,
        IssueTag::Proportionality,
        IssueTag::Biometrics,
        IssueTag::Safeguards,
        IssueTag::Expression,
        IssueTag::Religion,
        IssueTag::Equality,
        IssueTag::Trade,
        IssueTag::Assembly,
        IssueTag::Internet,
        IssueTag::Localization,
        IssueTag::Surveillance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legality => "legality",
            Self::Privacy => "privacy",
            Self::Proportionality => "proportionality",
            Self::Biometrics => "biometrics",
            Self::Safeguards => "safeguards",
            Self::Expression => "expression",
            Self::Religion => "religion",
            Self::Equality => "equality",
            Self::Trade => "trade",
            Self::Assembly => "assembly",
            Self::Internet => "internet",
            Self::Localization => "localization",
            Self::Surveillance => "surveillance",
        }
    }

    /// Human-readable label used in result cards and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Legality => "Legality / enabling law",
            Self::Privacy => "Article 21 privacy",
            Self::Proportionality => "Proportionality test",
            Self::Biometrics => "Biometric intrusion",
            Self::Safeguards => "Procedural safeguards",
            Self::Expression => "Article 19(1)(a) expression",
            Self::Religion => "Article 25 religion",
            Self::Equality => "Article 14 equality / arbitrariness",
            Self::Trade => "Article 19(1)(g) trade/business",
            Self::Assembly => "Article 19(1)(b) assembly",
            Self::Internet => "Internet access / shutdowns",
            Self::Localization => "Data localization",
            Self::Surveillance => "State surveillance / public safety",
        }
    }
}

impl fmt::Display for IssueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no tag in the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown issue tag: {0:?}")]
pub struct UnknownIssueTag(pub String);

impl FromStr for IssueTag {
    type Err = UnknownIssueTag;

    /// Case-insensitive; accepts the singular `biometric` used by older corpora.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        if needle == "biometric" {
            return Ok(Self::Biometrics);
        }
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == needle)
            .ok_or_else(|| UnknownIssueTag(s.to_string()))
    }
}
