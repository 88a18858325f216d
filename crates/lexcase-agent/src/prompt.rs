//! Prompt construction for the drafting stages.

use std::fmt::Write as _;
use std::str::FromStr;

use lexcase_core::{Query, ScoredPrecedent};
use lexcase_store::StyleFlags;
use serde::{Deserialize, Serialize};

use crate::plan::Plan;

pub const SYSTEM_RULES: &str = "You are a concise Indian constitutional law analyst. \
Do not reveal chain-of-thought or internal reasoning. \
Never output <think> blocks or similar. \
Avoid boilerplate, disclaimers, and repetition. \
Use only the requested section headings. \
Prefer 1-3 tight bullets per list; keep each bullet under 25 words. \
Cite only the provided titles and years; no footnotes or URLs. \
Output plain text only: no Markdown, no code fences, no formatting syntax.";

pub const VERDICT_HEADING: &str = "VERDICT";

const PROPORTIONALITY_CHECKLIST: [&str; 5] = [
    "Legality: is there a law authorising the measure?",
    "Legitimate aim: does it pursue a proper purpose?",
    "Suitability: is it rationally connected to that aim?",
    "Necessity: was a less restrictive alternative available?",
    "Balancing and safeguards: is the impact proportionate, with oversight and review?",
];

/// The side an argument is drafted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Petitioner,
    State,
}

impl Side {
    pub fn heading(self) -> &'static str {
        match self {
            Self::Petitioner => "PETITIONER ARGUMENTS",
            Self::State => "STATE ARGUMENTS",
        }
    }

    fn role(self) -> &'static str {
        match self {
            Self::Petitioner => "the petitioner challenging the measure",
            Self::State => "the State defending the measure",
        }
    }
}

/// Caller override for answer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreference {
    Bullets,
    Prose,
}

impl FromStr for StylePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullets" => Ok(Self::Bullets),
            "prose" => Ok(Self::Prose),
            other => Err(format!("unknown style {other:?}, expected bullets or prose")),
        }
    }
}

/// Style instructions learned from feedback, with an explicit preference
/// taking precedence over the learned bullet setting.
pub fn style_prefix(
    flags: StyleFlags,
    hints: &[String],
    preference: Option<StylePreference>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    match preference {
        Some(StylePreference::Bullets) => {
            parts.push("Use compact bullet points across sections where appropriate.".into())
        }
        Some(StylePreference::Prose) => {
            parts.push("Write in tight prose paragraphs; use bullets sparingly.".into())
        }
        None if flags.bullets >= 1 => parts.push("Use compact bullet points where helpful.".into()),
        None => {}
    }
    if flags.citations >= 1 {
        parts.push("Cite sources by title and year.".into());
    }
    if flags.proportionality_emphasis >= 1 {
        parts.push("Emphasize proportionality steps explicitly.".into());
    }
    if !hints.is_empty() {
        parts.push(format!("Reader notes: {}.", hints.join("; ")));
    }
    if parts.is_empty() {
        "Be concise.".into()
    } else {
        parts.join(" ")
    }
}

fn write_case(out: &mut String, query: &Query) {
    let _ = writeln!(out, "CASE\nTitle: {}\nFacts: {}\n", query.title, query.facts);
}

fn write_precedents(out: &mut String, precedents: &[ScoredPrecedent]) {
    out.push_str("PRECEDENTS (cite by title and year only)\n");
    if precedents.is_empty() {
        out.push_str("- none found; argue from constitutional text and say so\n");
    }
    for p in precedents {
        let d = &p.document;
        let _ = writeln!(out, "- {} [{}]: {}", d.citation(), d.court, d.text);
    }
    out.push('\n');
}

fn write_plan(out: &mut String, plan: &Plan) {
    out.push_str("PLAN WITH GROUNDED AUTHORITY\n");
    for (i, stage) in plan.stages.iter().enumerate() {
        let cites: Vec<&str> = stage.grounding.iter().map(|g| g.citation.as_str()).collect();
        let support = if cites.is_empty() {
            "ungrounded".to_string()
        } else {
            cites.join("; ")
        };
        let _ = writeln!(out, "{}. {} [{}]", i + 1, stage.claim, support);
    }
    out.push('\n');
}

pub fn argument_prompt(
    side: Side,
    style: &str,
    query: &Query,
    plan: &Plan,
    precedents: &[ScoredPrecedent],
) -> String {
    let mut out = format!("{style}\n");
    write_case(&mut out, query);
    write_precedents(&mut out, precedents);
    write_plan(&mut out, plan);
    let _ = write!(
        out,
        "You act for {role}. Argue this side using only the grounded material; cite title+year.\n\
         Start with the heading {heading} on its own line, then the arguments, one per plan stage \
         where the material allows. Mark any point without grounded authority as such.\n",
        role = side.role(),
        heading = side.heading(),
    );
    out
}

pub fn verdict_prompt(
    style: &str,
    query: &Query,
    petitioner: &str,
    state: &str,
    precedents: &[ScoredPrecedent],
) -> String {
    let mut out = format!("{style}\n");
    write_case(&mut out, query);
    write_precedents(&mut out, precedents);
    let _ = writeln!(out, "{}\n{petitioner}\n", Side::Petitioner.heading());
    let _ = writeln!(out, "{}\n{state}\n", Side::State.heading());
    out.push_str("PROPORTIONALITY CHECKLIST\n");
    for item in PROPORTIONALITY_CHECKLIST {
        let _ = writeln!(out, "- {item}");
    }
    let _ = write!(
        out,
        "\nWeigh both sides against the checklist. Start with the heading {VERDICT_HEADING} on its \
         own line, give the outcome in one or two sentences, then end with a line \
         'Confidence: <number between 0 and 1>'.\n"
    );
    out
}
