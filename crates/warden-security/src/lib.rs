//! # warden-security
//!
//! Security primitives for the WARDEN runtime. Nothing in this crate knows
//! about tools, sessions, or providers; each function answers one question
//! about a path, a command, or a piece of text.
//!
//! - [`sandbox`]: does this path stay inside the workspace after symlinks?
//! - [`command`]: how dangerous is this shell command?
//! - [`content`]: does this untrusted text try to steer the model?
//! - [`redact`]: what must be masked before text reaches the model or disk?

pub mod command;
pub mod content;
pub mod redact;
pub mod sandbox;

pub use command::{analyze_command, CommandRisk, RiskFinding};
pub use content::{guard, sanitize, scan, GuardedContent};
pub use redact::{contains_secret, redact_secrets, redact_value, REDACTION_MARKER};
pub use sandbox::{canonical_root, is_within, resolve_path, resolve_within};
