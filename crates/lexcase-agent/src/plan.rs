//! Analysis plan and its grounding in retrieved precedents.
//!
//! A plan always opens with the five proportionality stages, then adds one
//! branch stage per detected issue in vocabulary order. Grounding attaches to
//! each stage the precedents whose tags meet the stage's concerns; a stage
//! with no such precedent stays in the plan, marked ungrounded.

use std::collections::{BTreeMap, BTreeSet};

use lexcase_ai::IssueSpotter;
use lexcase_core::{IssueTag, ScoredPrecedent};
use serde::{Deserialize, Serialize};

const SNIPPET_WINDOW: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "issue")]
pub enum StageKind {
    Legality,
    Suitability,
    Necessity,
    BalancingSafeguards,
    Outcome,
    Branch(IssueTag),
}

impl StageKind {
    pub fn name(&self) -> String {
        match self {
            Self::Legality => "legality".into(),
            Self::Suitability => "suitability".into(),
            Self::Necessity => "necessity".into(),
            Self::BalancingSafeguards => "balancing/safeguards".into(),
            Self::Outcome => "outcome".into(),
            Self::Branch(tag) => format!("issue:{tag}"),
        }
    }

    fn claim(&self) -> &'static str {
        match self {
            Self::Legality => "Confirm enabling law (legality) and legitimate aim.",
            Self::Suitability => "Assess suitability of the measure to the aim.",
            Self::Necessity => "Assess necessity (less intrusive means).",
            Self::BalancingSafeguards => {
                "Assess balancing and safeguards (purpose, duration, oversight)."
            }
            Self::Outcome => "Draft positions and propose outcome.",
            Self::Branch(tag) => branch_claim(*tag),
        }
    }
}

fn branch_claim(tag: IssueTag) -> &'static str {
    match tag {
        IssueTag::Legality => "Identify the statutory source and whether the measure is ultra vires.",
        IssueTag::Privacy => "Test the intrusion into Article 21 privacy.",
        IssueTag::Proportionality => "Apply the structured proportionality test end to end.",
        IssueTag::Biometrics => "Weigh the intrusiveness of biometric collection and retention.",
        IssueTag::Safeguards => "Check procedural safeguards: review, audit and redress.",
        IssueTag::Expression => {
            "If Article 19(1)(a) is implicated, analyze reasonableness and proportionality."
        }
        IssueTag::Religion => "Consider Article 25 scope and any 25(2) justifications.",
        IssueTag::Equality => "Check Article 14 arbitrariness and equal protection concerns.",
        IssueTag::Trade => {
            "If Article 19(1)(g) is implicated, test reasonableness of restrictions."
        }
        IssueTag::Assembly => "If Article 19(1)(b) is implicated, test limits on peaceful assembly.",
        IssueTag::Internet => "Assess restrictions on internet access, their duration and review.",
        IssueTag::Localization => "Assess data localization and cross-border transfer limits.",
        IssueTag::Surveillance => "Assess state surveillance against public safety claims.",
    }
}

/// A precedent attached to a stage, with a pinpoint excerpt when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub document_id: String,
    pub citation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStage {
    pub kind: StageKind,
    pub name: String,
    pub claim: String,
    pub concerns: BTreeSet<IssueTag>,
    pub grounding: Vec<Grounding>,
}

impl PlanStage {
    fn new(kind: StageKind, concerns: BTreeSet<IssueTag>) -> Self {
        Self {
            kind,
            name: kind.name(),
            claim: kind.claim().to_string(),
            concerns,
            grounding: Vec::new(),
        }
    }

    pub fn is_grounded(&self) -> bool {
        !self.grounding.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub stages: Vec<PlanStage>,
}

impl Plan {
    /// Base stages, then one branch per issue in vocabulary order.
    pub fn build(issues: &BTreeSet<IssueTag>) -> Self {
        use IssueTag::*;

        let mut stages = vec![
            PlanStage::new(StageKind::Legality, BTreeSet::from([Legality])),
            PlanStage::new(StageKind::Suitability, BTreeSet::from([Proportionality])),
            PlanStage::new(StageKind::Necessity, BTreeSet::from([Proportionality])),
            PlanStage::new(
                StageKind::BalancingSafeguards,
                BTreeSet::from([Proportionality, Safeguards, Privacy, Biometrics, Surveillance]),
            ),
            PlanStage::new(StageKind::Outcome, issues.clone()),
        ];
        stages.extend(
            issues
                .iter()
                .map(|&tag| PlanStage::new(StageKind::Branch(tag), BTreeSet::from([tag]))),
        );
        Self { stages }
    }

    /// Attach every retrieved precedent whose tags meet a stage's concerns.
    ///
    /// Precedents keep their retrieval rank within each stage. Existing
    /// grounding is replaced.
    pub fn ground(&mut self, retrieved: &[ScoredPrecedent]) {
        for stage in &mut self.stages {
            stage.grounding = retrieved
                .iter()
                .filter(|p| !p.document.tags.is_disjoint(&stage.concerns))
                .map(|p| Grounding {
                    document_id: p.document.id.clone(),
                    citation: p.document.citation(),
                    snippet: extract_snippet(&p.document.text, &stage.concerns),
                })
                .collect();
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&PlanStage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn ungrounded(&self) -> impl Iterator<Item = &PlanStage> {
        self.stages.iter().filter(|s| !s.is_grounded())
    }

    /// Claim text to the ids of the precedents grounding it.
    pub fn citations(&self) -> BTreeMap<String, Vec<String>> {
        self.stages
            .iter()
            .map(|s| {
                let ids = s.grounding.iter().map(|g| g.document_id.clone()).collect();
                (s.claim.clone(), ids)
            })
            .collect()
    }
}

/// A window of text around the first mention of any concern, with ellipses
/// where the excerpt is cut.
fn extract_snippet(text: &str, concerns: &BTreeSet<IssueTag>) -> Option<String> {
    let spotter = IssueSpotter::new();
    let at = concerns.iter().find_map(|&tag| spotter.locate(tag, text))?;

    let mut start = at.saturating_sub(SNIPPET_WINDOW / 2);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + SNIPPET_WINDOW / 2).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = String::new();
    if start > 0 {
        snippet.push('…');
    }
    snippet.push_str(text[start..end].trim());
    if end < text.len() {
        snippet.push('…');
    }
    Some(snippet)
}
