//! Content-threat findings produced by the content guard.
//!
//! Threats are transient: they describe what was neutralized in a piece of
//! untrusted text and are never persisted with their raw matched text.

use serde::{Deserialize, Serialize};

use crate::action::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    PromptInjection,
    DataExfiltration,
    SuspiciousEncoding,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::PromptInjection => "prompt_injection",
            ThreatKind::DataExfiltration => "data_exfiltration",
            ThreatKind::SuspiciousEncoding => "suspicious_encoding",
        }
    }
}

impl std::fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentThreat {
    pub kind: ThreatKind,
    pub severity: Severity,
    /// Short name of the pattern that matched.
    pub pattern: String,
    pub matched_text: String,
    /// Byte offset of the match in the scanned text.
    pub position: usize,
}
