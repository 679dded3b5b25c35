//! # warden-policy
//!
//! A TOML-configured, default-deny permission policy for the WARDEN runtime.
//!
//! ## Overview
//!
//! [`PermissionsConfig`] is loaded once per session from
//! `.warden/permissions.toml`. [`PermissionPolicy`] wraps it with compiled
//! deny patterns and answers every gate the tool dispatcher and the
//! orchestrator consult: path containment, write gating, command gating,
//! network gating, and approval derivation.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use warden_policy::{PermissionPolicy, PermissionsConfig};
//!
//! let config = PermissionsConfig::load_or_default(Path::new("."))?;
//! let policy = PermissionPolicy::new(config);
//! assert!(!policy.is_command_allowed("sudo rm -rf /").is_allowed());
//! ```

pub mod action;
pub mod config;
pub mod engine;

pub use action::{assess_risk, describe};
pub use config::{PermissionsConfig, CONFIG_DIR, DEFAULT_DENY_PATTERNS, PERMISSIONS_FILE};
pub use engine::{Decision, PermissionPolicy};

// ── Tests ─────────────────────────────────────────────────────────────────────
