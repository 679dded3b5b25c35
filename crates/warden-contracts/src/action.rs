//! Proposed actions and risk levels.
//!
//! A `ProposedAction` is what the approval collaborator sees before a
//! side-effecting tool runs. Its `requires_approval` flag is derived from the
//! permission policy once, at construction, and never re-derived.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three-level risk shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// Severity assigned by the analysis tables (command risk, content threats).
///
/// Ordered so that `max()` over a set of findings yields the overall value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Collapse onto the operator-facing scale. Critical is reported as high;
    /// critical commands are blocked before anyone is asked.
    pub fn to_risk(self) -> RiskLevel {
        match self {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High | Severity::Critical => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub tool: String,
    pub arguments: Map<String, Value>,
    /// Human-readable one-liner, e.g. "Run command: cargo test".
    pub description: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    /// True when the approval requirement was raised by taint escalation.
    #[serde(default)]
    pub escalated: bool,
}

impl ProposedAction {
    /// Whether the operator must be prompted, given the session's
    /// auto-approve setting.
    ///
    /// Auto-approve only ever skips the prompt for low-risk actions that were
    /// not escalated by the content guard.
    pub fn needs_prompt(&self, auto_approve: bool) -> bool {
        if !self.requires_approval {
            return false;
        }
        !(auto_approve && self.risk == RiskLevel::Low && !self.escalated)
    }
}
