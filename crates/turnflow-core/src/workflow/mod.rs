//! Deterministic replay workflow engine.
//!
//! - `task` -- task variants, chaining, and the futures a workflow awaits
//! - `bound` -- memoized function calls recorded in history
//! - `context` -- the builder API a workflow coroutine is written against
//! - `journal` -- replay cursor and the offer/delivery handshake
//! - `dispatcher` -- replay, resume, execute, suspend, complete
//! - `fluent` -- the coroutine exposed as a dialog
//! - `retry` -- retry policies and delay curves
//! - `hash` -- identity hashing
//! - `error` -- task and workflow errors

pub mod bound;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod fluent;
pub mod hash;
mod journal;
pub mod retry;
pub mod task;

pub use bound::BoundFn;
pub use context::WorkflowContext;
pub use dispatcher::{Dispatcher, RunMode, Suspension, TurnOutcome, WorkflowFn};
pub use error::{TaskError, WorkflowError};
pub use fluent::FluentDialog;
pub use retry::{DelayCurve, NeverRetry, RetryDecision, RetryPolicy, RetrySettings};
pub use task::{RestartTask, Task, TaskFuture, TaskKind};
