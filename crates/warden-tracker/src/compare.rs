//! Determinism check between two traces.
//!
//! Two traces are equivalent when they have the same number of snapshots and
//! the fingerprints agree pairwise. Timestamps, run ids and labels are
//! ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

use warden_contracts::trace::{ExecutionTrace, StateSnapshot, Trigger};

/// Where two traces first disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Index of the first differing snapshot.
    pub index: usize,
    /// Trigger of the snapshot at `index`, from whichever side has one.
    pub trigger: Trigger,
    pub tool_name: Option<String>,
    /// `None` when that side ended before `index`.
    pub left_fingerprint: Option<String>,
    pub right_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceComparison {
    pub left_len: usize,
    pub right_len: usize,
    pub divergence: Option<Divergence>,
}

impl TraceComparison {
    pub fn is_equivalent(&self) -> bool {
        self.divergence.is_none()
    }
}

pub fn compare(left: &ExecutionTrace, right: &ExecutionTrace) -> TraceComparison {
    let a = &left.snapshots;
    let b = &right.snapshots;

    let mismatch = a
        .iter()
        .zip(b)
        .position(|(x, y)| x.fingerprint != y.fingerprint);

    let index = match mismatch {
        Some(i) => Some(i),
        None if a.len() != b.len() => Some(a.len().min(b.len())),
        None => None,
    };

    let divergence = index.and_then(|i| {
        let l = a.get(i);
        let r = b.get(i);
        let reference: &StateSnapshot = l.or(r)?;
        Some(Divergence {
            index: i,
            trigger: reference.trigger,
            tool_name: reference.tool_name.clone(),
            left_fingerprint: l.map(|s| s.fingerprint.clone()),
            right_fingerprint: r.map(|s| s.fingerprint.clone()),
        })
    });

    TraceComparison {
        left_len: a.len(),
        right_len: b.len(),
        divergence,
    }
}

impl fmt::Display for TraceComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.divergence {
            None => write!(f, "equivalent ({} snapshots)", self.left_len),
            Some(d) => {
                write!(
                    f,
                    "diverged at snapshot {} ({}{}); lengths {} and {}",
                    d.index,
                    d.trigger,
                    d.tool_name
                        .as_deref()
                        .map(|t| format!(": {t}"))
                        .unwrap_or_default(),
                    self.left_len,
                    self.right_len
                )
            }
        }
    }
}
