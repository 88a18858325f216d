use lexcase_ai::BackendError;
use lexcase_core::RetrievalError;
use thiserror::Error;

use crate::AgentState;
use crate::prompt::Side;

/// An LLM response that cannot be split into the expected sections.
#[derive(Debug, Error, PartialEq)]
pub enum DraftingError {
    #[error("response has no {0} section")]
    MissingSection(&'static str),

    #[error("{0} section is empty")]
    EmptySection(&'static str),
}

impl DraftingError {
    pub(crate) fn missing(side: Side) -> Self {
        Self::MissingSection(side.heading())
    }

    pub(crate) fn empty(side: Side) -> Self {
        Self::EmptySection(side.heading())
    }
}

#[derive(Debug, Error)]
pub enum AgentCause {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Drafting(#[from] DraftingError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Coarse failure class, used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retrieval,
    Drafting,
    Backend,
}

/// A run that ended in `Failed`: the stage it failed in and why.
#[derive(Debug, Error)]
#[error("agent failed at {stage}: {cause}")]
pub struct AgentError {
    pub stage: AgentState,
    #[source]
    pub cause: AgentCause,
}

impl AgentError {
    pub fn new(stage: AgentState, cause: impl Into<AgentCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.cause {
            AgentCause::Retrieval(_) => ErrorKind::Retrieval,
            AgentCause::Drafting(_) => ErrorKind::Drafting,
            AgentCause::Backend(_) => ErrorKind::Backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_cause() {
        let err = AgentError::new(
            AgentState::DraftArguments,
            DraftingError::missing(Side::Petitioner),
        );
        let msg = err.to_string();
        assert!(msg.contains("draft_arguments"), "{msg}");
        assert!(msg.contains("PETITIONER ARGUMENTS"), "{msg}");
        assert_eq!(err.kind(), ErrorKind::Drafting);
    }

    #[test]
    fn backend_errors_classify_as_backend() {
        let err = AgentError::new(AgentState::DraftVerdict, BackendError::Timeout { secs: 3 });
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("timed out"));
    }
}
