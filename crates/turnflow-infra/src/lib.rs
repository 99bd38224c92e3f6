//! Infrastructure layer for Turnflow.
//!
//! Adapters for the ports defined in `turnflow-core`: in-memory and JSON-file
//! conversation state stores, a dialog-stack host that runs registered dialogs
//! turn by turn, a text prompt dialog, and engine config loading.

pub mod config;
pub mod host;
pub mod prompt;
pub mod state;
