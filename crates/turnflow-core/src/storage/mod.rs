//! Storage abstractions for Turnflow.
//!
//! Defines the conversation state store port.
//! Implementations live in turnflow-infra.

pub mod state_store;
