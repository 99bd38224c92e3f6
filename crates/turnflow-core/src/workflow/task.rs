//! Tasks: what a workflow awaits.
//!
//! A [`Task<T>`] describes one unit of schedulable work and is rebuilt every
//! time the coroutine reaches its yield point, on replay and live execution
//! alike. Only its outcome is ever persisted.
//!
//! Awaiting a task turns it into a [`YieldedTask`] (kind, hashed identity,
//! effect, retry policy) and hands it to the dispatcher through the journal.
//! The typed projector then maps the recorded JSON back to `T`.
//!
//! [`RestartTask`] is a separate type: it suspends by replacing
//! the instance and carries no resume handler, so it has no `then`,
//! `project`, or typed result.

use std::convert::Infallible;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use turnflow_types::dialog::DialogTurnResult;

use super::error::{TaskError, WorkflowError, recorded_value};
use super::journal::SharedJournal;
use super::retry::RetryPolicy;
use crate::dialog::host::TurnContext;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The four yieldable task variants. The string form is what history stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AsyncCall,
    DialogCall,
    ReceiveActivity,
    Restart,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::AsyncCall => "AsyncCall",
            TaskKind::DialogCall => "DialogCall",
            TaskKind::ReceiveActivity => "ReceiveActivity",
            TaskKind::Restart => "Restart",
        }
    }

    /// Whether awaiting this kind can end the host turn.
    pub fn suspends(&self) -> bool {
        !matches!(self, TaskKind::AsyncCall)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Erased task
// ---------------------------------------------------------------------------

pub(crate) type InvokeFn =
    Arc<dyn Fn(TurnContext) -> BoxFuture<'static, Result<Value, TaskError>> + Send + Sync>;

pub(crate) type ResumeFn = Arc<
    dyn Fn(TurnContext, Option<Value>) -> BoxFuture<'static, Result<Value, TaskError>>
        + Send
        + Sync,
>;

pub(crate) type SuspendFn = Box<
    dyn FnOnce(TurnContext) -> BoxFuture<'static, Result<DialogTurnResult, WorkflowError>> + Send,
>;

pub(crate) type Projector<T> = Arc<dyn Fn(Value) -> Result<T, WorkflowError> + Send + Sync>;

type StepFn<T, U> =
    Arc<dyn Fn(T, TurnContext) -> BoxFuture<'static, Result<U, TaskError>> + Send + Sync>;

/// What the dispatcher does with a yielded task once replay has caught up.
pub(crate) enum Effect {
    /// Execute now, within the current turn.
    Call(InvokeFn),
    /// End the turn through `on_suspend`; a later turn delivers the external
    /// result to `on_resume`.
    Await {
        on_suspend: SuspendFn,
        on_resume: ResumeFn,
    },
    /// End the turn by replacing the instance. Never resumed.
    Replace { on_suspend: SuspendFn },
}

/// A task as the dispatcher sees it: no result type, identity already hashed.
pub(crate) struct YieldedTask {
    pub(crate) kind: TaskKind,
    pub(crate) hashed_identity: String,
    pub(crate) effect: Effect,
    pub(crate) retry: Option<Arc<dyn RetryPolicy>>,
}

/// Projector that deserializes the recorded value into `T`.
pub(crate) fn decode<T: DeserializeOwned + 'static>() -> Projector<T> {
    Arc::new(|value: Value| {
        serde_json::from_value::<T>(value).map_err(|e| WorkflowError::Projection(e.to_string()))
    })
}

// ---------------------------------------------------------------------------
// Task<T>
// ---------------------------------------------------------------------------

/// How a typed task produces the value it records.
enum Step {
    Call(InvokeFn),
    Await {
        on_suspend: SuspendFn,
        on_resume: ResumeFn,
    },
}

/// A schedulable unit of work yielding `T` when awaited.
///
/// Await it directly or via [`Task::result`]. A failure recorded for the task
/// surfaces as [`WorkflowError::TaskFailed`] (or [`WorkflowError::Workflow`]
/// for a workflow-level rejection) at the await, both when it first happens
/// and on every replay.
#[must_use = "a task does nothing until it is awaited"]
pub struct Task<T> {
    journal: SharedJournal,
    kind: TaskKind,
    identity: String,
    step: Step,
    projector: Projector<T>,
    retry: Option<Arc<dyn RetryPolicy>>,
}

impl<T: DeserializeOwned + Send + 'static> Task<T> {
    pub(crate) fn call(journal: SharedJournal, identity: String, invoke: InvokeFn) -> Self {
        Self {
            journal,
            kind: TaskKind::AsyncCall,
            identity,
            step: Step::Call(invoke),
            projector: decode(),
            retry: None,
        }
    }

    pub(crate) fn suspending(
        journal: SharedJournal,
        kind: TaskKind,
        identity: String,
        on_suspend: SuspendFn,
        on_resume: ResumeFn,
    ) -> Self {
        Self {
            journal,
            kind,
            identity,
            step: Step::Await {
                on_suspend,
                on_resume,
            },
            projector: decode(),
            retry: None,
        }
    }
}

impl<T: Send + 'static> Task<T> {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Chain a synchronous continuation onto the task's work.
    ///
    /// The continuation runs as part of the task when it executes and its
    /// output is what gets recorded; on replay it is not run again. No new
    /// history entry is added.
    pub fn then<U, F>(self, continuation: F) -> Task<U>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T, &TurnContext) -> Result<U, TaskError> + Send + Sync + 'static,
    {
        self.then_async(move |value, turn| std::future::ready(continuation(value, &turn)))
    }

    /// Asynchronous form of [`Task::then`].
    pub fn then_async<U, F, Fut>(self, continuation: F) -> Task<U>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T, TurnContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, TaskError>> + Send + 'static,
    {
        let continuation: StepFn<T, U> =
            Arc::new(move |value, turn| continuation(value, turn).boxed());
        let step = match self.step {
            Step::Call(invoke) => Step::Call(chain_invoke(invoke, self.projector, continuation)),
            Step::Await {
                on_suspend,
                on_resume,
            } => Step::Await {
                on_suspend,
                on_resume: chain_resume(on_resume, self.projector, continuation),
            },
        };
        Task {
            journal: self.journal,
            kind: self.kind,
            identity: self.identity,
            step,
            projector: decode(),
            retry: self.retry,
        }
    }

    /// Change the observable type. The recorded value is untouched and the
    /// mapping is re-applied on every replay, so it must be pure.
    pub fn project<U, F>(self, mapping: F) -> Task<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let inner = self.projector;
        Task {
            journal: self.journal,
            kind: self.kind,
            identity: self.identity,
            step: self.step,
            projector: Arc::new(move |value: Value| inner(value).map(&mapping)),
            retry: self.retry,
        }
    }

    /// Attach a retry policy, replacing the dispatcher's default.
    pub fn configure_retry(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Some(Arc::new(policy));
        self
    }

    /// Await the task's value.
    pub fn result(self) -> TaskFuture<T> {
        self.into_future()
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Result<T, WorkflowError>;
    type IntoFuture = TaskFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let hashed_identity = self
            .journal
            .lock()
            .expect("journal lock poisoned")
            .hash(&self.identity);
        let effect = match self.step {
            Step::Call(invoke) => Effect::Call(invoke),
            Step::Await {
                on_suspend,
                on_resume,
            } => Effect::Await {
                on_suspend,
                on_resume,
            },
        };
        TaskFuture::new(
            self.journal,
            YieldedTask {
                kind: self.kind,
                hashed_identity,
                effect,
                retry: self.retry,
            },
            self.projector,
        )
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

fn chain_invoke<T, U>(invoke: InvokeFn, projector: Projector<T>, step: StepFn<T, U>) -> InvokeFn
where
    T: Send + 'static,
    U: Serialize + Send + 'static,
{
    Arc::new(move |turn: TurnContext| {
        let pending = invoke(turn.clone());
        let projector = Arc::clone(&projector);
        let step = Arc::clone(&step);
        async move {
            let value = pending.await?;
            let output = step(projector(value)?, turn).await?;
            Ok::<Value, TaskError>(serde_json::to_value(output)?)
        }
        .boxed()
    })
}

fn chain_resume<T, U>(on_resume: ResumeFn, projector: Projector<T>, step: StepFn<T, U>) -> ResumeFn
where
    T: Send + 'static,
    U: Serialize + Send + 'static,
{
    Arc::new(move |turn: TurnContext, input: Option<Value>| {
        let pending = on_resume(turn.clone(), input);
        let projector = Arc::clone(&projector);
        let step = Arc::clone(&step);
        async move {
            let value = pending.await?;
            let output = step(projector(value)?, turn).await?;
            Ok::<Value, TaskError>(serde_json::to_value(output)?)
        }
        .boxed()
    })
}

// ---------------------------------------------------------------------------
// TaskFuture
// ---------------------------------------------------------------------------

/// Future of an awaited [`Task`].
///
/// First poll offers the task to the dispatcher and returns `Pending`. The
/// dispatcher resolves the task and polls the workflow again, at which point
/// the delivered outcome is projected and returned.
#[must_use = "futures do nothing unless awaited"]
pub struct TaskFuture<T> {
    journal: SharedJournal,
    pending: Option<YieldedTask>,
    ticket: Option<u64>,
    projector: Projector<T>,
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(journal: SharedJournal, task: YieldedTask, projector: Projector<T>) -> Self {
        Self {
            journal,
            pending: Some(task),
            ticket: None,
            projector,
        }
    }
}

impl<T> Future for TaskFuture<T> {
    type Output = Result<T, WorkflowError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let delivered = {
            let mut journal = this.journal.lock().expect("journal lock poisoned");
            if let Some(task) = this.pending.take() {
                return match journal.offer(task) {
                    Ok(ticket) => {
                        this.ticket = Some(ticket);
                        Poll::Pending
                    }
                    Err(err) => Poll::Ready(Err(err)),
                };
            }
            match this.ticket {
                Some(ticket) => journal.take_delivery(ticket),
                None => None,
            }
        };

        match delivered {
            Some(result) => {
                Poll::Ready(recorded_value(result).and_then(|value| (this.projector)(value)))
            }
            None => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// RestartTask
// ---------------------------------------------------------------------------

/// Restart the workflow with new options, discarding all history.
///
/// Awaiting it never yields a value: the current instance is replaced and
/// the coroutine is abandoned. Write `match ctx.restart(next).await? {}`.
#[must_use = "a task does nothing until it is awaited"]
pub struct RestartTask {
    journal: SharedJournal,
    identity: String,
    on_suspend: SuspendFn,
}

impl RestartTask {
    pub(crate) fn new(journal: SharedJournal, identity: String, on_suspend: SuspendFn) -> Self {
        Self {
            journal,
            identity,
            on_suspend,
        }
    }
}

impl IntoFuture for RestartTask {
    type Output = Result<Infallible, WorkflowError>;
    type IntoFuture = RestartFuture;

    fn into_future(self) -> Self::IntoFuture {
        let hashed_identity = self
            .journal
            .lock()
            .expect("journal lock poisoned")
            .hash(&self.identity);
        let task = YieldedTask {
            kind: TaskKind::Restart,
            hashed_identity,
            effect: Effect::Replace {
                on_suspend: self.on_suspend,
            },
            retry: None,
        };
        RestartFuture {
            inner: TaskFuture::new(
                self.journal,
                task,
                Arc::new(|value: Value| Ok::<Value, WorkflowError>(value)),
            ),
        }
    }
}

/// Future of an awaited [`RestartTask`]. Only ever resolves with an error.
#[must_use = "futures do nothing unless awaited"]
pub struct RestartFuture {
    inner: TaskFuture<Value>,
}

impl Future for RestartFuture {
    type Output = Result<Infallible, WorkflowError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Ready(Ok(_)) => Poll::Ready(Err(WorkflowError::nondeterminism(
                "a restart task received a result",
            ))),
        }
    }
}
