//! Agent orchestration: issue spotting, retrieval, planning, grounding and
//! LLM drafting of both sides and a verdict.

pub mod draft;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod prompt;
mod state;

pub use error::{AgentCause, AgentError, DraftingError, ErrorKind};
pub use orchestrator::{AgentConfig, AgentOrchestrator, AgentResult, AgentRun, Verdict};
pub use plan::{Grounding, Plan, PlanStage, StageKind};
pub use prompt::{Side, StylePreference};
pub use state::{AgentState, StageRecord};
