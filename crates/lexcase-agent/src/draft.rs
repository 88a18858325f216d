//! Parsing of drafted LLM output into sections and a verdict.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DraftingError;
use crate::prompt::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    Petitioner,
    State,
    Verdict,
    Other,
}

const HEADINGS: [(&str, Heading); 9] = [
    ("petitioner arguments", Heading::Petitioner),
    ("petitioner argument", Heading::Petitioner),
    ("state arguments", Heading::State),
    ("state argument", Heading::State),
    ("respondent arguments", Heading::State),
    ("verdict", Heading::Verdict),
    ("core issues", Heading::Other),
    ("proportionality", Heading::Other),
    ("proportionality analysis", Heading::Other),
];

/// A `Confidence ...: value` line; labels such as `Confidence (0-1):` are
/// skipped up to the colon.
static CONFIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s*_#-]*confidence\b[^:\n]*:[\s*_]*([0-9]+(?:\.[0-9]+)?)\s*(%)?")
        .unwrap_or_else(|e| panic!("confidence pattern does not compile: {e}"))
});

/// Recognise a heading line such as `2) Petitioner Arguments:` or
/// `**STATE ARGUMENTS**`, returning the heading and any text after a colon.
///
/// List bullets are body text even when they open with a heading word, and
/// the non-side headings only count when nothing follows the colon.
fn heading(line: &str) -> Option<(Heading, &str)> {
    let trimmed = line.trim();
    if is_bullet(trimmed) {
        return None;
    }
    let stripped =
        trimmed.trim_start_matches(|c: char| c.is_ascii_digit() || "#*.)( ".contains(c));
    let (head, rest) = match stripped.split_once(':') {
        Some((head, rest)) => (
            head,
            rest.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()),
        ),
        None => (stripped, ""),
    };
    let head = head
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    HEADINGS
        .iter()
        .find(|(name, _)| *name == head)
        .map(|&(_, kind)| (kind, rest))
        .filter(|&(kind, rest)| kind != Heading::Other || rest.is_empty())
}

/// `- item`, `• item` or `* item`; `**bold**` is not a bullet.
fn is_bullet(line: &str) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some('-' | '\u{2022}' | '\u{2013}') => true,
        Some('*') => chars.next().is_some_and(char::is_whitespace),
        _ => false,
    }
}

/// Body under the first heading of `kind`, up to the next heading.
fn section(text: &str, kind: Heading) -> Option<String> {
    let mut lines = text.lines();
    let inline = lines.by_ref().find_map(|line| match heading(line) {
        Some((k, rest)) if k == kind => Some(rest),
        _ => None,
    })?;

    let mut body = vec![inline];
    body.extend(lines.take_while(|line| heading(line).is_none()));
    Some(body.join("\n").trim().to_string())
}

/// The argument drafted for `side`, which must sit under its own heading and
/// be non-empty.
pub fn extract_argument(text: &str, side: Side) -> Result<String, DraftingError> {
    let kind = match side {
        Side::Petitioner => Heading::Petitioner,
        Side::State => Heading::State,
    };
    match section(text, kind) {
        None => Err(DraftingError::missing(side)),
        Some(body) if body.is_empty() => Err(DraftingError::empty(side)),
        Some(body) => Ok(body),
    }
}

/// Confidence from the last `Confidence: x` line whose value lies in
/// `[0, 1]`. Percentages are scaled down.
pub fn parse_confidence(text: &str) -> Option<f32> {
    let values: Vec<f32> = CONFIDENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let mut value: f32 = caps.get(1)?.as_str().parse().ok()?;
            if caps.get(2).is_some() {
                value /= 100.0;
            }
            Some(value)
        })
        .collect();
    values
        .into_iter()
        .rev()
        .find(|v| v.is_finite() && (0.0..=1.0).contains(v))
}

/// Verdict text (without the confidence line) and the parsed confidence.
pub fn parse_verdict(text: &str) -> (String, Option<f32>) {
    let confidence = parse_confidence(text);
    let body = section(text, Heading::Verdict).unwrap_or_else(|| text.to_string());
    let verdict = body
        .lines()
        .filter(|line| {
            !line
                .trim_start_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
                .to_ascii_lowercase()
                .starts_with("confidence")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    (verdict, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT: &str = "\
1) Core Issues
- Whether a blanket shutdown is proportionate.

2) Petitioner Arguments:
- Indefinite suspension fails necessity (Anuradha Bhasin v Union of India (2020)).
- No review committee was convened.

3) STATE ARGUMENTS
- Exams integrity is a legitimate aim.

4) Proportionality
- Legality: Telegraph Act.
";

    #[test]
    fn extracts_each_side_up_to_next_heading() {
        let p = extract_argument(DRAFT, Side::Petitioner).unwrap();
        assert!(p.starts_with("- Indefinite suspension"));
        assert!(p.ends_with("No review committee was convened."));
        let s = extract_argument(DRAFT, Side::State).unwrap();
        assert_eq!(s, "- Exams integrity is a legitimate aim.");
    }

    #[test]
    fn labelled_bullets_stay_in_the_argument() {
        let text = "PETITIONER ARGUMENTS\n\
- Proportionality: a blanket shutdown fails necessity (Anuradha Bhasin v Union of India (2020)).\n\
- Legality: no published order.\n\
* Verdict: should be quashed.\n\
STATE ARGUMENTS\n\
\u{2022} Proportionality: exams justify it.";
        let p = extract_argument(text, Side::Petitioner).unwrap();
        assert!(p.starts_with("- Proportionality: a blanket shutdown"));
        assert!(p.ends_with("* Verdict: should be quashed."));
        let s = extract_argument(text, Side::State).unwrap();
        assert_eq!(s, "\u{2022} Proportionality: exams justify it.");
    }

    #[test]
    fn inline_body_after_colon_counts() {
        let text = "**Petitioner Arguments:** The order is disproportionate.";
        assert_eq!(
            extract_argument(text, Side::Petitioner).unwrap(),
            "The order is disproportionate."
        );
    }

    #[test]
    fn missing_or_empty_sections_fail() {
        assert_eq!(
            extract_argument("Just some unstructured prose.", Side::Petitioner),
            Err(DraftingError::MissingSection("PETITIONER ARGUMENTS"))
        );
        assert_eq!(
            extract_argument("STATE ARGUMENTS\n\nVerdict\nAllowed.", Side::State),
            Err(DraftingError::EmptySection("STATE ARGUMENTS"))
        );
    }

    #[test]
    fn mentions_in_prose_are_not_headings() {
        let text = "The petitioner arguments rest on Article 21.\nSTATE ARGUMENTS\nAim is valid.";
        assert!(extract_argument(text, Side::Petitioner).is_err());
        assert_eq!(extract_argument(text, Side::State).unwrap(), "Aim is valid.");
    }

    #[test]
    fn parses_confidence_forms() {
        assert_eq!(parse_confidence("Confidence: 0.72"), Some(0.72));
        assert_eq!(parse_confidence("**Confidence:** 85%"), Some(0.85));
        assert_eq!(parse_confidence("Confidence (0-1): 0.8"), Some(0.8));
        assert_eq!(parse_confidence("Confidence: 7"), None);
        assert_eq!(parse_confidence("Confidence: high"), None);
        assert_eq!(parse_confidence("no number"), None);
    }

    #[test]
    fn confidence_ignores_numbers_in_prose() {
        let text = "VERDICT\nThe order erodes public confidence in 2024 exams less than it claims.\nConfidence: 0.8";
        let (verdict, confidence) = parse_verdict(text);
        assert_eq!(confidence, Some(0.8));
        assert!(verdict.contains("public confidence in 2024"));
        assert_eq!(parse_confidence("Confidence: 0.9\nConfidence: 3"), Some(0.9));
    }

    #[test]
    fn verdict_drops_confidence_line() {
        let text = "VERDICT\nThe shutdown order is set aside.\nConfidence: 0.8";
        let (verdict, confidence) = parse_verdict(text);
        assert_eq!(verdict, "The shutdown order is set aside.");
        assert_eq!(confidence, Some(0.8));
    }

    #[test]
    fn verdict_without_heading_uses_whole_text() {
        let (verdict, confidence) = parse_verdict("Petition allowed in part.");
        assert_eq!(verdict, "Petition allowed in part.");
        assert_eq!(confidence, None);
    }
}
