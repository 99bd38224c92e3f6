//! Drives a workflow coroutine through one host turn.
//!
//! Each run polls the coroutine from the start with a no-op waker. Every
//! time it parks on a task the dispatcher takes the offered task and moves
//! through these phases:
//!
//! - **Replaying**: history has an unread entry. Check `(kind, hash)` and feed
//!   the recorded outcome back.
//! - **Resuming**: history is exhausted and a suspension is outstanding. The
//!   task must match the persisted resume state; its resume handler gets the
//!   external result and the outcome is recorded.
//! - **Executing**: an `AsyncCall` is run now (with retries) and recorded.
//! - **Suspended**: a suspending task with nothing left to replay or resume.
//!   Resume state is set and the task's suspend hook is handed to the host.
//! - **Completed**: the coroutine returned.
//!
//! History is only ever appended once the cursor has caught up with it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::task::noop_waker_ref;
use serde_json::Value;

use turnflow_types::dialog::DialogTurnResult;
use turnflow_types::workflow::{ResumeState, TaskResult, WorkflowState};

use super::context::WorkflowContext;
use super::error::WorkflowError;
use super::hash::IdentityHasher;
use super::journal::{Journal, SharedJournal};
use super::retry::{NeverRetry, RetryPolicy, run_with_retry};
use super::task::{Effect, SuspendFn, TaskKind, YieldedTask};
use crate::dialog::host::TurnContext;

// ---------------------------------------------------------------------------
// Workflow functions
// ---------------------------------------------------------------------------

/// A workflow coroutine: a function from context to a future of the result.
///
/// Implemented for every `Fn(WorkflowContext<O>) -> impl Future` that is
/// `Send + Sync + 'static`, including plain `async fn`s.
pub trait WorkflowFn<O>: Send + Sync + 'static {
    type Output;
    type Future: Future<Output = Result<Self::Output, WorkflowError>> + Send + 'static;

    fn start(&self, ctx: WorkflowContext<O>) -> Self::Future;
}

impl<O, R, F, Fut> WorkflowFn<O> for F
where
    F: Fn(WorkflowContext<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, WorkflowError>> + Send + 'static,
{
    type Output = R;
    type Future = Fut;

    fn start(&self, ctx: WorkflowContext<O>) -> Fut {
        self(ctx)
    }
}

// ---------------------------------------------------------------------------
// Run mode / outcome
// ---------------------------------------------------------------------------

/// Why the host is running the workflow this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Fresh instance, empty history.
    Begin,
    /// Next inbound activity; resolves a pending `ReceiveActivity`.
    Continue,
    /// A child dialog ended with this result.
    Resume(Option<Value>),
}

impl RunMode {
    fn input(self) -> Option<Option<Value>> {
        match self {
            RunMode::Begin => None,
            RunMode::Continue => Some(None),
            RunMode::Resume(result) => Some(result),
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum TurnOutcome<R> {
    /// The coroutine returned; the host should end the instance.
    Completed(R),
    /// The coroutine is waiting; the host should apply the suspension.
    Suspended(Suspension),
}

/// The suspend hook of the task a run ended on.
pub struct Suspension {
    kind: TaskKind,
    on_suspend: SuspendFn,
}

impl Suspension {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Tell the host how to wait: begin a child, wait for input, or replace
    /// the instance.
    pub async fn apply(self, turn: TurnContext) -> Result<DialogTurnResult, WorkflowError> {
        (self.on_suspend)(turn).await
    }
}

impl std::fmt::Debug for Suspension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suspension").field("kind", &self.kind).finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Replays, resumes, and executes one workflow instance for one turn.
pub struct Dispatcher<O> {
    options: Arc<O>,
    journal: SharedJournal,
    resume_state: Option<ResumeState>,
    turn: TurnContext,
    dialog_id: Arc<str>,
    default_retry: Arc<dyn RetryPolicy>,
}

impl<O: Send + Sync + 'static> Dispatcher<O> {
    pub fn new(state: WorkflowState<O>, turn: TurnContext, dialog_id: impl Into<Arc<str>>) -> Self {
        Self {
            options: Arc::new(state.options),
            journal: Journal::new(state.history).shared(),
            resume_state: state.resume_state,
            turn,
            dialog_id: dialog_id.into(),
            default_retry: Arc::new(NeverRetry),
        }
    }

    pub fn with_hasher(self, hasher: Arc<dyn IdentityHasher>) -> Self {
        self.lock().set_hasher(hasher);
        self
    }

    /// Policy for tasks that have none of their own.
    pub fn with_default_retry(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.default_retry = policy;
        self
    }

    pub fn is_suspended(&self) -> bool {
        self.resume_state.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.lock().len()
    }

    /// Run the coroutine until it suspends or completes.
    ///
    /// Task failures reach the coroutine as errors it can handle. Determinism
    /// faults, unsupported awaits, and errors the coroutine returns abort the
    /// run; the state must not be persisted in that case.
    pub async fn run<W>(
        &mut self,
        flow: &W,
        mode: RunMode,
    ) -> Result<TurnOutcome<W::Output>, WorkflowError>
    where
        W: WorkflowFn<O>,
    {
        let mut input = mode.input();
        match (&input, &self.resume_state) {
            (Some(_), None) => {
                return Err(self.fail(WorkflowError::nondeterminism(
                    "resumed an instance that is not waiting on a task",
                )));
            }
            (None, Some(pending)) => {
                return Err(self.fail(WorkflowError::nondeterminism(format!(
                    "began an instance that is still waiting on '{}'",
                    pending.kind
                ))));
            }
            _ => {}
        }
        self.lock().rewind(self.resume_state.is_some());

        let ctx = WorkflowContext::new(
            Arc::clone(&self.options),
            self.turn.clone(),
            Arc::clone(&self.dialog_id),
            Arc::clone(&self.journal),
        );
        let mut coroutine = Box::pin(flow.start(ctx));

        loop {
            let polled = poll_once(coroutine.as_mut());
            let fault = self.lock().take_fault();
            if let Some(fault) = fault {
                return Err(self.fail(fault));
            }

            let (ticket, task) = match polled {
                Poll::Ready(Ok(result)) => {
                    self.check_completed()?;
                    tracing::debug!(
                        dialog_id = %self.dialog_id,
                        history_len = self.history_len(),
                        "workflow completed"
                    );
                    return Ok(TurnOutcome::Completed(result));
                }
                Poll::Ready(Err(err)) => {
                    tracing::debug!(dialog_id = %self.dialog_id, error = %err, "workflow returned an error");
                    return Err(err);
                }
                Poll::Pending => {
                    let offer = self.lock().take_offer();
                    match offer {
                        Some(offer) => offer,
                        None => {
                            return Err(self.fail(WorkflowError::UnsupportedAwait(
                                "the workflow awaited a future that is not a workflow task"
                                    .to_string(),
                            )));
                        }
                    }
                }
            };

            let YieldedTask {
                kind,
                hashed_identity,
                effect,
                retry,
            } = task;

            // Replaying
            let replayed = self.lock().replay_next(kind.as_str(), &hashed_identity);
            if let Some(result) = replayed.map_err(|e| self.fail(e))? {
                tracing::debug!(%kind, cursor = self.lock().cursor(), "replayed task");
                self.lock().deliver(ticket, result);
                continue;
            }

            let policy = retry.unwrap_or_else(|| Arc::clone(&self.default_retry));

            // Resuming
            if let Some(expected) = self.resume_state.take() {
                if expected.kind != kind.as_str() || expected.hashed_identity != hashed_identity {
                    return Err(self.fail(WorkflowError::nondeterminism(format!(
                        "expected to resume '{}' but the workflow issued '{}'",
                        expected.kind, kind
                    ))));
                }
                let Effect::Await { on_resume, .. } = effect else {
                    return Err(self.fail(WorkflowError::nondeterminism(format!(
                        "'{kind}' cannot be resumed"
                    ))));
                };
                self.lock().finish_resume();

                let value = input.take().flatten();
                let turn = self.turn.clone();
                let result = run_with_retry(policy.as_ref(), kind.as_str(), || {
                    on_resume(turn.clone(), value.clone())
                })
                .await;
                tracing::debug!(%kind, success = result.is_success(), "resumed task");
                self.record(ticket, kind, &hashed_identity, result)?;
                continue;
            }

            match effect {
                // Executing
                Effect::Call(invoke) => {
                    let turn = self.turn.clone();
                    let result =
                        run_with_retry(policy.as_ref(), kind.as_str(), || invoke(turn.clone()))
                            .await;
                    tracing::debug!(%kind, success = result.is_success(), "executed task");
                    self.record(ticket, kind, &hashed_identity, result)?;
                }
                // Suspended
                Effect::Await { on_suspend, .. } | Effect::Replace { on_suspend } => {
                    self.resume_state = Some(ResumeState {
                        kind: kind.as_str().to_string(),
                        hashed_identity,
                    });
                    tracing::debug!(
                        dialog_id = %self.dialog_id,
                        %kind,
                        history_len = self.history_len(),
                        "workflow suspended"
                    );
                    return Ok(TurnOutcome::Suspended(Suspension { kind, on_suspend }));
                }
            }
        }
    }

    /// The state to persist after a suspended run.
    pub fn into_state(self) -> WorkflowState<O>
    where
        O: Clone,
    {
        let history = self.lock().take_history();
        let options = Arc::try_unwrap(self.options).unwrap_or_else(|shared| (*shared).clone());
        WorkflowState {
            options,
            history,
            resume_state: self.resume_state,
        }
    }

    fn record(
        &self,
        ticket: u64,
        kind: TaskKind,
        hashed_identity: &str,
        result: TaskResult,
    ) -> Result<(), WorkflowError> {
        let mut journal = self.lock();
        journal
            .append(kind.as_str(), hashed_identity, result.clone())
            .map_err(|e| {
                tracing::error!(%kind, error = %e, "workflow determinism fault");
                e
            })?;
        journal.deliver(ticket, result);
        Ok(())
    }

    fn check_completed(&self) -> Result<(), WorkflowError> {
        if let Some(pending) = &self.resume_state {
            return Err(self.fail(WorkflowError::nondeterminism(format!(
                "the workflow completed without reaching the '{}' it was waiting on",
                pending.kind
            ))));
        }
        let (cursor, len) = {
            let journal = self.lock();
            (journal.cursor(), journal.len())
        };
        if cursor != len {
            return Err(self.fail(WorkflowError::nondeterminism(format!(
                "the workflow completed after replaying {cursor} of {len} history entries"
            ))));
        }
        Ok(())
    }

    fn fail(&self, err: WorkflowError) -> WorkflowError {
        tracing::error!(dialog_id = %self.dialog_id, error = %err, "workflow run aborted");
        err
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().expect("journal lock poisoned")
    }
}

/// Poll a future exactly once with a waker that does nothing.
fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.poll(&mut cx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
