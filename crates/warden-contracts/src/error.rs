//! Runtime error types for the WARDEN agent runtime.
//!
//! Expected policy outcomes (a denied path, a disabled tool, a blocked
//! command) are NOT errors: they travel back to the model as
//! `ToolResult::error`. `WardenError` covers the failures that end a turn or
//! a command-line invocation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    /// The provider could not produce a response. Ends the turn early.
    #[error("provider request failed: {reason}")]
    ProviderFailed { reason: String },

    /// The approval collaborator could not be consulted.
    #[error("approval request failed: {reason}")]
    ApprovalFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The execution trace could not be persisted.
    ///
    /// Callers log and ignore this; a trace is a diagnostic artifact.
    #[error("trace write failed: {reason}")]
    TraceWriteFailed { reason: String },

    /// The run log could not be appended to.
    #[error("run log write failed: {reason}")]
    RunLogWriteFailed { reason: String },

    /// A tool call could not be interpreted at all.
    #[error("invalid tool call: {reason}")]
    InvalidToolCall { reason: String },

    /// A filesystem or process operation outside the tool path failed.
    #[error("i/o error: {reason}")]
    Io { reason: String },
}

/// Convenience alias used throughout the WARDEN crates.
pub type WardenResult<T> = Result<T, WardenError>;
