//! The agent state machine.
//!
//! A run walks `SpotIssues → Retrieve → Plan → Ground → DraftArguments →
//! DraftVerdict → Done`, or stops in `Failed` at the first error. Runs share
//! the retriever and backend read-only, so one orchestrator serves
//! concurrent queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use lexcase_ai::{
    BackendError, ChunkSink, CompletionBackend, CompletionRequest, IssueSpotter,
    PrecedentRetriever, ResponseMode,
};
use lexcase_core::{IssueTag, Query, ScoredPrecedent};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::draft::{extract_argument, parse_verdict};
use crate::error::{AgentCause, AgentError};
use crate::plan::Plan;
use crate::prompt::{self, Side, StylePreference, SYSTEM_RULES};
use crate::state::{AgentState, StageRecord, Trace};

pub const NO_PRECEDENT_NOTE: &str = "no precedent found";
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Precedents retrieved per run.
    pub top_k: usize,
    /// How many of the top precedents are shown to the model.
    pub prompt_precedents: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub mode: ResponseMode,
    pub style: Option<StylePreference>,
    /// Pause before retrying a call that timed out.
    pub retry_backoff: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            prompt_precedents: 4,
            temperature: 0.35,
            max_tokens: 1700,
            mode: ResponseMode::Buffered,
            style: None,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub issues: BTreeSet<IssueTag>,
    pub retrieved: Vec<ScoredPrecedent>,
    pub plan: Plan,
    pub petitioner_argument: String,
    pub state_argument: String,
    pub verdict: Verdict,
    /// Plan claim to the ids of the precedents grounding it.
    pub citations: BTreeMap<String, Vec<String>>,
    /// Degradations recovered from along the way.
    pub notes: Vec<String>,
    /// Documents shown to the model; the subject of thumbs-up/down feedback.
    pub used_document_ids: Vec<String>,
}

/// Terminal outcome of a run together with its stage trace.
#[derive(Debug)]
pub struct AgentRun {
    pub outcome: Result<AgentResult, AgentError>,
    pub trace: Vec<StageRecord>,
}

impl AgentRun {
    /// `Done` or `Failed`.
    pub fn final_state(&self) -> AgentState {
        if self.outcome.is_ok() {
            AgentState::Done
        } else {
            AgentState::Failed
        }
    }

    pub fn into_result(self) -> Result<AgentResult, AgentError> {
        self.outcome
    }
}

pub struct AgentOrchestrator {
    retriever: Arc<PrecedentRetriever>,
    backend: Arc<dyn CompletionBackend>,
    spotter: IssueSpotter,
    config: AgentConfig,
}

impl AgentOrchestrator {
    pub fn new(
        retriever: Arc<PrecedentRetriever>,
        backend: Arc<dyn CompletionBackend>,
        config: AgentConfig,
    ) -> Self {
        Self {
            retriever,
            backend,
            spotter: IssueSpotter::new(),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn retriever(&self) -> &PrecedentRetriever {
        &self.retriever
    }

    /// Run the full pipeline for one query. Streamed model output goes to `sink`.
    pub async fn run(&self, query: &Query, sink: &dyn ChunkSink) -> AgentRun {
        let mut trace = Trace::default();
        let outcome = self.drive(query, sink, &mut trace).await;
        match &outcome {
            Ok(result) => trace.record(
                AgentState::Done,
                format!("confidence {:.2}", result.verdict.confidence),
            ),
            Err(e) => {
                warn!(stage = %e.stage, error = %e.cause, "agent run failed");
                trace.record(AgentState::Failed, e.to_string());
            }
        }
        AgentRun {
            outcome,
            trace: trace.into_records(),
        }
    }

    async fn drive(
        &self,
        query: &Query,
        sink: &dyn ChunkSink,
        trace: &mut Trace,
    ) -> Result<AgentResult, AgentError> {
        let mut notes = Vec::new();

        let issues = self.spotter.spot(query);
        trace.record(AgentState::SpotIssues, format!("{} issues", issues.len()));

        let retrieved = self
            .retriever
            .retrieve_with_issues(query, &issues, self.config.top_k)
            .map_err(|e| AgentError::new(AgentState::Retrieve, e))?;
        if retrieved.is_empty() {
            warn!("no precedent found for query");
            notes.push(NO_PRECEDENT_NOTE.to_string());
        }
        trace.record(AgentState::Retrieve, format!("{} precedents", retrieved.len()));

        let mut plan = Plan::build(&issues);
        trace.record(AgentState::Plan, format!("{} stages", plan.stages.len()));

        plan.ground(&retrieved);
        let ungrounded = plan.ungrounded().count();
        trace.record(
            AgentState::Ground,
            format!("{} grounded, {ungrounded} ungrounded", plan.stages.len() - ungrounded),
        );

        let shown = &retrieved[..retrieved.len().min(self.config.prompt_precedents)];
        let feedback = self.retriever.feedback();
        let style = prompt::style_prefix(
            feedback.style_flags(),
            &feedback.style_hints(),
            self.config.style,
        );

        let mut arguments = Vec::with_capacity(2);
        for side in [Side::Petitioner, Side::State] {
            let request = self.request(prompt::argument_prompt(side, &style, query, &plan, shown));
            let text = self
                .complete(AgentState::DraftArguments, &request, sink, trace)
                .await?;
            let argument = extract_argument(&text, side)
                .map_err(|e| AgentError::new(AgentState::DraftArguments, e))?;
            arguments.push(argument);
        }
        let state_argument = arguments.pop().unwrap_or_default();
        let petitioner_argument = arguments.pop().unwrap_or_default();
        trace.record(AgentState::DraftArguments, "petitioner and state drafted");

        let request = self.request(prompt::verdict_prompt(
            &style,
            query,
            &petitioner_argument,
            &state_argument,
            shown,
        ));
        let text = self
            .complete(AgentState::DraftVerdict, &request, sink, trace)
            .await?;
        let (verdict_text, confidence) = parse_verdict(&text);
        let confidence = confidence.unwrap_or_else(|| {
            warn!("verdict confidence missing or out of range, using default");
            notes.push(format!(
                "verdict confidence unparseable; defaulted to {DEFAULT_CONFIDENCE}"
            ));
            DEFAULT_CONFIDENCE
        });
        trace.record(AgentState::DraftVerdict, format!("confidence {confidence:.2}"));

        info!(
            issues = issues.len(),
            precedents = retrieved.len(),
            confidence,
            "agent run complete"
        );
        Ok(AgentResult {
            issues,
            citations: plan.citations(),
            used_document_ids: shown.iter().map(|p| p.document.id.clone()).collect(),
            retrieved,
            plan,
            petitioner_argument,
            state_argument,
            verdict: Verdict {
                text: verdict_text,
                confidence,
            },
            notes,
        })
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            system: SYSTEM_RULES.to_string(),
            prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            mode: self.config.mode,
        }
    }

    /// One backend call, retried once after the backoff if it timed out.
    async fn complete(
        &self,
        stage: AgentState,
        request: &CompletionRequest,
        sink: &dyn ChunkSink,
        trace: &mut Trace,
    ) -> Result<String, AgentError> {
        let first = self.backend.complete(request, sink).await;
        let result = match first {
            Err(e) if e.is_retryable() => {
                warn!(%stage, error = %e, backoff_ms = self.config.retry_backoff.as_millis() as u64, "retrying backend call");
                trace.record(stage, format!("retry after: {e}"));
                tokio::time::sleep(self.config.retry_backoff).await;
                self.backend.complete(request, sink).await
            }
            other => other,
        };
        result.map_err(|e: BackendError| AgentError {
            stage,
            cause: AgentCause::Backend(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexcase_ai::{HashingEmbedder, NullSink, VectorIndex};
    use lexcase_core::{Court, Document, RetrievalConfig};
    use lexcase_store::FeedbackStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every prompt.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, BackendError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, BackendError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
            _sink: &dyn ChunkSink,
        ) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Unavailable("script exhausted".into())))
        }
    }

    fn retriever(documents: Vec<Document>) -> Arc<PrecedentRetriever> {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let index = Arc::new(VectorIndex::build(documents, embedder.as_ref()).unwrap());
        let config = RetrievalConfig {
            current_year: Some(2025),
            ..Default::default()
        };
        Arc::new(
            PrecedentRetriever::new(index, embedder, Arc::new(FeedbackStore::in_memory()), config)
                .unwrap(),
        )
    }

    fn bhasin() -> Document {
        Document {
            id: "bhasin-2020".into(),
            title: "Anuradha Bhasin v. Union of India".into(),
            year: 2020,
            court: Court::Supreme,
            tags: [IssueTag::Internet, IssueTag::Proportionality].into(),
            text: "Indefinite internet shutdown orders must satisfy proportionality and periodic review.".into(),
            level_weight: None,
        }
    }

    fn orchestrator(docs: Vec<Document>, backend: Arc<Scripted>) -> AgentOrchestrator {
        let config = AgentConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        AgentOrchestrator::new(retriever(docs), backend, config)
    }

    fn ok(s: &str) -> Result<String, BackendError> {
        Ok(s.to_string())
    }

    fn query() -> Query {
        Query::new("Internet shutdown", "A blanket internet shutdown was ordered.")
    }

    #[tokio::test]
    async fn empty_corpus_completes_with_note() {
        let backend = Arc::new(Scripted::new(vec![
            ok("PETITIONER ARGUMENTS\nNo authority; Article 19(1)(a) applies."),
            ok("STATE ARGUMENTS\nPublic order."),
            ok("VERDICT\nOrder quashed.\nConfidence: 0.7"),
        ]));
        let run = orchestrator(vec![], backend.clone()).run(&query(), &NullSink).await;
        assert_eq!(run.final_state(), AgentState::Done);
        let result = run.into_result().unwrap();
        assert!(result.retrieved.is_empty());
        assert!(result.notes.iter().any(|n| n == NO_PRECEDENT_NOTE));
        assert!(result.plan.stages.iter().all(|s| !s.is_grounded()));
        assert_eq!(result.verdict.confidence, 0.7);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn unparseable_confidence_defaults_with_note() {
        let backend = Arc::new(Scripted::new(vec![
            ok("PETITIONER ARGUMENTS\nP."),
            ok("STATE ARGUMENTS\nS."),
            ok("VERDICT\nDismissed.\nConfidence: very high"),
        ]));
        let result = orchestrator(vec![bhasin()], backend)
            .run(&query(), &NullSink)
            .await
            .into_result()
            .unwrap();
        assert_eq!(result.verdict.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(result.verdict.text, "Dismissed.");
        assert!(result.notes.iter().any(|n| n.contains("defaulted")));
    }

    #[tokio::test]
    async fn trace_walks_every_state_in_order() {
        let backend = Arc::new(Scripted::new(vec![
            ok("PETITIONER ARGUMENTS\nP."),
            ok("STATE ARGUMENTS\nS."),
            ok("VERDICT\nAllowed.\nConfidence: 0.6"),
        ]));
        let run = orchestrator(vec![bhasin()], backend).run(&query(), &NullSink).await;
        let states: Vec<AgentState> = run.trace.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                AgentState::SpotIssues,
                AgentState::Retrieve,
                AgentState::Plan,
                AgentState::Ground,
                AgentState::DraftArguments,
                AgentState::DraftVerdict,
                AgentState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn prompts_carry_grounding_and_style() {
        let backend = Arc::new(Scripted::new(vec![
            ok("PETITIONER ARGUMENTS\nP."),
            ok("STATE ARGUMENTS\nS."),
            ok("VERDICT\nAllowed.\nConfidence: 0.6"),
        ]));
        let result = orchestrator(vec![bhasin()], backend.clone())
            .run(&query(), &NullSink)
            .await
            .into_result()
            .unwrap();
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("PETITIONER ARGUMENTS"));
        assert!(prompts[1].contains("STATE ARGUMENTS"));
        assert!(prompts[0].contains("Anuradha Bhasin v. Union of India (2020)"));
        assert!(prompts[0].starts_with("Cite sources by title and year."));
        assert!(prompts[2].contains("PETITIONER ARGUMENTS\nP."));
        assert_eq!(result.used_document_ids, vec!["bhasin-2020".to_string()]);
    }

    #[tokio::test]
    async fn non_timeout_backend_error_is_not_retried() {
        let backend = Arc::new(Scripted::new(vec![Err(BackendError::Server {
            status: 503,
            body: "busy".into(),
        })]));
        let run = orchestrator(vec![bhasin()], backend.clone())
            .run(&query(), &NullSink)
            .await;
        assert_eq!(run.final_state(), AgentState::Failed);
        let err = run.into_result().unwrap_err();
        assert_eq!(err.stage, AgentState::DraftArguments);
        assert_eq!(err.kind(), crate::ErrorKind::Backend);
        assert_eq!(backend.calls(), 1);
    }
}
