//! Orchestrator states and the per-run transition trace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Pipeline position. Working states run in declaration order; `Done` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    SpotIssues,
    Retrieve,
    Plan,
    Ground,
    DraftArguments,
    DraftVerdict,
    Done,
    Failed,
}

impl AgentState {
    /// Successor on the happy path; terminal states have none.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::SpotIssues => Some(Self::Retrieve),
            Self::Retrieve => Some(Self::Plan),
            Self::Plan => Some(Self::Ground),
            Self::Ground => Some(Self::DraftArguments),
            Self::DraftArguments => Some(Self::DraftVerdict),
            Self::DraftVerdict => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpotIssues => "spot_issues",
            Self::Retrieve => "retrieve",
            Self::Plan => "plan",
            Self::Ground => "ground",
            Self::DraftArguments => "draft_arguments",
            Self::DraftVerdict => "draft_verdict",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a run's trace, stamped when it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub state: AgentState,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only trace of one run. Every entry is also logged.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    records: Vec<StageRecord>,
}

impl Trace {
    pub(crate) fn record(&mut self, state: AgentState, detail: impl Into<String>) {
        let record = StageRecord {
            state,
            detail: detail.into(),
            timestamp: Utc::now(),
        };
        info!(state = %record.state, detail = %record.detail, "agent stage");
        self.records.push(record);
    }

    pub(crate) fn into_records(self) -> Vec<StageRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_linear() {
        let mut state = AgentState::SpotIssues;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state);
            visited.push(next);
            state = next;
        }
        assert_eq!(visited.len(), 7);
        assert_eq!(state, AgentState::Done);
        assert!(AgentState::Failed.next().is_none());
        assert!(AgentState::Failed.is_terminal());
        assert!(!AgentState::Ground.is_terminal());
    }

    #[test]
    fn trace_keeps_order() {
        let mut trace = Trace::default();
        trace.record(AgentState::SpotIssues, "2 issues");
        trace.record(AgentState::Retrieve, "5 precedents");
        let records = trace.into_records();
        assert_eq!(records[1].state, AgentState::Retrieve);
        assert!(records[0].timestamp <= records[1].timestamp);
    }
}
