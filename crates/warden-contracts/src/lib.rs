//! # warden-contracts
//!
//! Shared types and contracts for the WARDEN agent runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod action;
pub mod error;
pub mod message;
pub mod threat;
pub mod tool;
pub mod trace;
