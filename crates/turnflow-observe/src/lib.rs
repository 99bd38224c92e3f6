//! Observability setup for Turnflow binaries.

pub mod tracing_setup;
