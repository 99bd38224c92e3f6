//! Deterministic replay workflow engine for turn-based conversations.
//!
//! This crate defines the engine (tasks, dispatcher, workflow entry point)
//! and the "ports" the infrastructure layer implements: the dialog host
//! contract and the conversation state store. It depends only on
//! `turnflow-types` -- never on `turnflow-infra` or any storage crate.

pub mod dialog;
pub mod storage;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
