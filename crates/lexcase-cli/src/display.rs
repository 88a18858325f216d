//! Vertical card display for agent results and retrieved precedents.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use lexcase_agent::{AgentResult, StageRecord};
use lexcase_core::{IssueTag, ScoredPrecedent};

const MAX_CITATIONS: usize = 4;

/// Render a finished run as a card grouped by pipeline section.
///
/// Argument bodies are left out when they were already streamed to the
/// terminal.
pub fn result_card(result: &AgentResult, title: &str, show_drafts: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {title} ===\n");

    section(&mut out, "Issues");
    issue_lines(&mut out, &result.issues);

    section(&mut out, "Top Precedents");
    precedent_lines(&mut out, &result.retrieved);

    section(&mut out, "Plan");
    for (i, stage) in result.plan.stages.iter().enumerate() {
        let cites: Vec<&str> = stage
            .grounding
            .iter()
            .take(MAX_CITATIONS)
            .map(|g| g.citation.as_str())
            .collect();
        let support = if cites.is_empty() {
            "ungrounded".to_string()
        } else {
            cites.join("; ")
        };
        let _ = writeln!(out, "  {:>2}. {}", i + 1, stage.claim);
        let _ = writeln!(out, "      cites: {support}");
        if let Some(snippet) = stage.grounding.first().and_then(|g| g.snippet.as_deref()) {
            let _ = writeln!(out, "      \u{2022} {snippet}");
        }
    }
    out.push('\n');

    if show_drafts {
        section(&mut out, "Petitioner Arguments");
        indented(&mut out, &result.petitioner_argument);
        section(&mut out, "State Arguments");
        indented(&mut out, &result.state_argument);
    }

    section(&mut out, "Verdict");
    indented(&mut out, &result.verdict.text);
    let _ = writeln!(out, "  {:<26} {:.2}\n", "confidence", result.verdict.confidence);

    if !result.notes.is_empty() {
        section(&mut out, "Notes");
        for note in &result.notes {
            let _ = writeln!(out, "  - {note}");
        }
        out.push('\n');
    }
    out
}

/// Score breakdown table for `lexcase search`.
pub fn precedent_table(precedents: &[ScoredPrecedent], issues: &BTreeSet<IssueTag>) -> String {
    let mut out = String::new();
    section(&mut out, "Issues");
    issue_lines(&mut out, issues);
    section(&mut out, "Precedents");
    if precedents.is_empty() {
        out.push_str("  (no precedent found)\n");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<4} {:<44} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "#", "precedent", "score", "sim", "rec", "court", "issue", "boost"
    );
    for (i, p) in precedents.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:<4} {:<44} {:>6.3} {:>6.3} {:>6.2} {:>6.2} {:>6.2} {:>+6.2}",
            i + 1,
            truncate(&p.document.citation(), 44),
            p.composite_score,
            p.similarity,
            p.recency,
            p.court_weight,
            p.issue_overlap,
            p.feedback_boost,
        );
    }
    out
}

pub fn issue_list(issues: &BTreeSet<IssueTag>) -> String {
    let mut out = String::new();
    issue_lines(&mut out, issues);
    out
}

pub fn trace_lines(trace: &[StageRecord]) -> String {
    let mut out = String::new();
    section(&mut out, "Trace");
    for record in trace {
        let _ = writeln!(
            out,
            "  {} {:<16} {}",
            record.timestamp.format("%H:%M:%S%.3f"),
            record.state.as_str(),
            record.detail
        );
    }
    out
}

// ── Helpers ──

fn section(out: &mut String, header: &str) {
    let _ = writeln!(out, "{header}");
}

fn issue_lines(out: &mut String, issues: &BTreeSet<IssueTag>) {
    if issues.is_empty() {
        out.push_str("  (none detected)\n\n");
        return;
    }
    for tag in issues {
        let _ = writeln!(out, "  {:<26} {}", tag.as_str(), tag.label());
    }
    out.push('\n');
}

fn precedent_lines(out: &mut String, precedents: &[ScoredPrecedent]) {
    if precedents.is_empty() {
        out.push_str("  (no precedent found)\n\n");
        return;
    }
    for p in precedents {
        let _ = writeln!(
            out,
            "  {:<60} score={:.2}  [{}]",
            truncate(&p.document.citation(), 60),
            p.composite_score,
            p.document.court
        );
    }
    out.push('\n');
}

fn indented(out: &mut String, text: &str) {
    for line in text.lines() {
        let _ = writeln!(out, "  {line}");
    }
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
    cut.push('\u{2026}');
    cut
}
