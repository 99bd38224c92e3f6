//! Shared data types for Turnflow.
//!
//! Persisted workflow state, conversation activities, dialog-stack data,
//! configuration, and the error enums shared across crates.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod activity;
pub mod config;
pub mod dialog;
pub mod error;
pub mod workflow;
