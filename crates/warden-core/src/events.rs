//! Typed notifications from the orchestration loop.
//!
//! Events go to an explicit channel handed to the orchestrator. Nothing
//! subscribes globally; a dropped receiver is ignored.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use warden_contracts::action::RiskLevel;

pub type EventSink = UnboundedSender<AgentEvent>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The turn crossed `percent`% of its iteration cap.
    BudgetAdvisory {
        iteration: usize,
        max_iterations: usize,
        percent: u8,
    },
    /// The session has used more than twice the per-turn cap in total.
    SessionBudgetAdvisory {
        total_iterations: usize,
        max_iterations: usize,
    },
    ReflexionInjected {
        consecutive_errors: usize,
    },
    ContextPruned {
        removed_messages: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    ContentThreatDetected {
        tool: String,
        threats: usize,
        kinds: Vec<String>,
    },
    ApprovalRequested {
        tool: String,
        risk: RiskLevel,
        escalated: bool,
    },
    ApprovalResolved {
        tool: String,
        approved: bool,
    },
    ToolCompleted {
        tool: String,
        call_id: String,
        is_error: bool,
    },
}
