//! Keyword issue spotting.
//!
//! A static table maps each [`IssueTag`] to one case-insensitive regex
//! alternation. All patterns are compiled once into a [`RegexSet`]; a single
//! pass over the normalized query text yields every matching tag.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use lexcase_core::{IssueTag, Query};
use regex::{Regex, RegexSet};

/// One row per tag, in vocabulary order.
const KEYWORDS: [(IssueTag, &str); 13] = [
    (
        IssueTag::Legality,
        r"\b(?:statute|statutory|legality|ultra vires|backed by law|enabling law|law)\b",
    ),
    (
        IssueTag::Privacy,
        r"\b(?:privacy|fundamental right|data protection|personal data)\b|\bart(?:icle)?s?\.?\s+(?:[0-9()a-z]+\s*(?:,|and)\s*)*21\b",
    ),
    (
        IssueTag::Proportionality,
        r"\b(?:proportional(?:ity)?|least restrictive|less intrusive|necessity|balancing|blanket|reasonable restrictions?)\b",
    ),
    (
        IssueTag::Biometrics,
        r"\b(?:biometrics?|aadhaar|fingerprints?|iris|face recognition|facial recognition)\b",
    ),
    (
        IssueTag::Safeguards,
        r"\b(?:safeguards?|oversight|data protection|audits?|breach(?:es)?)\b",
    ),
    (
        IssueTag::Expression,
        r"19\s*\(1\)\s*\(a\)|\b(?:freedom of speech|expression|symbolic|dress|slogans?)\b",
    ),
    (
        IssueTag::Religion,
        r"\barticle\s+25\b|\b(?:religion|religious|hijab|turban|kirpan|faith|worship)\b",
    ),
    (
        IssueTag::Equality,
        r"\barticle\s+14\b|\b(?:equality|equal|discrimination|discriminatory|arbitrary|arbitrariness)\b",
    ),
    (
        IssueTag::Trade,
        r"19\s*\(1\)\s*\(g\)|\b(?:trade|business|commerce|e-commerce)\b",
    ),
    (
        IssueTag::Assembly,
        r"19\s*\(1\)\s*\(b\)|\b(?:protests?|assembly|demonstrations?)\b",
    ),
    (
        IssueTag::Internet,
        r"\b(?:internet|shutdowns?|broadband|telecom|mobile data)\b",
    ),
    (
        IssueTag::Localization,
        r"\b(?:localization|localisation|cross-border|data transfers?)\b",
    ),
    (
        IssueTag::Surveillance,
        r"\b(?:surveillance|cctv|public safety|tracking)\b",
    ),
];

static MATCHER: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(KEYWORDS.iter().map(|(_, pattern)| format!("(?i){pattern}")))
        .unwrap_or_else(|e| panic!("issue keyword table does not compile: {e}"))
});

/// The same table as individual regexes, for locating a tag's keywords.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .map(|(_, pattern)| Regex::new(&format!("(?i){pattern}")))
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| panic!("issue keyword table does not compile: {e}"))
});

/// Stateless issue spotter over the static keyword table.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueSpotter;

impl IssueSpotter {
    pub fn new() -> Self {
        Self
    }

    /// Tags raised by the query's title and facts, plus its explicit hints.
    pub fn spot(&self, query: &Query) -> BTreeSet<IssueTag> {
        let mut tags = self.spot_text(&query.text());
        tags.extend(query.issue_hints.iter().copied());
        tags
    }

    /// Tags raised by free text alone.
    pub fn spot_text(&self, text: &str) -> BTreeSet<IssueTag> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return BTreeSet::new();
        }
        MATCHER
            .matches(&normalized)
            .into_iter()
            .map(|i| KEYWORDS[i].0)
            .collect()
    }

    /// Byte offset of the first keyword for `tag` in `text`.
    pub fn locate(&self, tag: IssueTag, text: &str) -> Option<usize> {
        let row = KEYWORDS.iter().position(|(t, _)| *t == tag)?;
        PATTERNS[row].find(text).map(|m| m.start())
    }
}

/// Lowercase and collapse whitespace runs so multi-word keywords match across
/// line breaks.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shutdown_query() -> Query {
        Query::new(
            "2024 State-wide Internet Shutdown During Competitive Exams",
            "The State imposed a blanket shutdown of mobile data and broadband for five days \
             to prevent cheating. Petitioners allege violation of Articles 19(1)(a) and 21.",
        )
    }

    #[test]
    fn table_is_in_vocabulary_order() {
        let tags: Vec<IssueTag> = KEYWORDS.iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, IssueTag::ALL.to_vec());
        assert_eq!(MATCHER.len(), IssueTag::ALL.len());
    }

    #[test]
    fn detects_shutdown_issues() {
        let tags = IssueSpotter.spot(&shutdown_query());
        for expected in [
            IssueTag::Internet,
            IssueTag::Proportionality,
            IssueTag::Expression,
            IssueTag::Privacy,
        ] {
            assert!(tags.contains(&expected), "missing {expected}: {tags:?}");
        }
        assert!(!tags.contains(&IssueTag::Religion));
    }

    #[test]
    fn article_numbers_are_matched_exactly() {
        let spot = |s: &str| IssueSpotter.spot_text(s);
        assert!(spot("Article 21 of the Constitution").contains(&IssueTag::Privacy));
        assert!(spot("Articles 14, 19 and 21").contains(&IssueTag::Privacy));
        assert!(!spot("Article 210 of the Constitution").contains(&IssueTag::Privacy));
        assert!(spot("Art. 19 (1) (g) trade licence").contains(&IssueTag::Trade));
    }

    #[test]
    fn locate_finds_keyword_stems() {
        let text = "The scheme stores a biometric template per citizen.";
        assert_eq!(IssueSpotter.locate(IssueTag::Biometrics, text), text.find("biometric"));
        assert_eq!(IssueSpotter.locate(IssueTag::Trade, text), None);
    }

    #[test]
    fn matching_is_case_and_whitespace_insensitive() {
        let tags = IssueSpotter.spot_text("FACIAL\n   RECOGNITION cameras");
        assert!(tags.contains(&IssueTag::Biometrics));
    }

    #[test]
    fn empty_input_yields_only_hints() {
        assert!(IssueSpotter.spot_text("   ").is_empty());
        let q = Query::new("", "").with_hints([IssueTag::Religion]);
        assert_eq!(IssueSpotter.spot(&q), BTreeSet::from([IssueTag::Religion]));
    }

    #[test]
    fn spotting_is_pure_and_includes_hints() {
        let q = shutdown_query().with_hints([IssueTag::Assembly, IssueTag::Localization]);
        let first = IssueSpotter.spot(&q);
        for _ in 0..5 {
            assert_eq!(IssueSpotter.spot(&q), first);
        }
        assert!(q.issue_hints.is_subset(&first));
    }
}
