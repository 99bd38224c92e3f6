//! The handle a workflow coroutine is written against.
//!
//! Every effect a workflow has on the outside world goes through
//! [`WorkflowContext`]: each builder returns a task to await, a bound
//! function, or a recorded built-in value. Workflow code must not reach the
//! host, the clock, or random sources any other way, or replay stops being
//! deterministic.

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use turnflow_types::activity::{Activity, Choice, PromptOptions, ResourceResponse, TokenResponse};
use turnflow_types::dialog::DialogTurnResult;
use turnflow_types::workflow::TaskResult;

use super::bound::{BoundFn, bound_kind};
use super::error::{TaskError, WorkflowError, recorded_value};
use super::journal::{SharedJournal, record_once};
use super::task::{RestartTask, Task, TaskKind, decode};
use crate::dialog::host::TurnContext;

/// History kind of the recorded clock built-in.
pub const CURRENT_UTC_TIME_KIND: &str = "currentUtcTime";
/// History kind of the recorded id built-in.
pub const NEW_GUID_KIND: &str = "newGuid";

const RECEIVE_ACTIVITY_IDENTITY: &str = "receiveActivity";
const SIGN_IN_FAILED: &str = "Sign-in failed.";

/// Context passed to a workflow coroutine for one run.
pub struct WorkflowContext<O> {
    options: Arc<O>,
    turn: TurnContext,
    dialog_id: Arc<str>,
    journal: SharedJournal,
}

impl<O> Clone for WorkflowContext<O> {
    fn clone(&self) -> Self {
        Self {
            options: Arc::clone(&self.options),
            turn: self.turn.clone(),
            dialog_id: Arc::clone(&self.dialog_id),
            journal: Arc::clone(&self.journal),
        }
    }
}

impl<O: Send + Sync + 'static> WorkflowContext<O> {
    pub(crate) fn new(
        options: Arc<O>,
        turn: TurnContext,
        dialog_id: Arc<str>,
        journal: SharedJournal,
    ) -> Self {
        Self {
            options,
            turn,
            dialog_id,
            journal,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The options the current instance was started with.
    pub fn options(&self) -> &O {
        &self.options
    }

    pub fn channel_id(&self) -> String {
        self.turn.activity().channel_id
    }

    /// Id of the dialog running this workflow.
    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    /// True while the coroutine is being fed recorded outcomes. Use it to
    /// skip logging or metrics that should happen once per live execution.
    pub fn is_replaying(&self) -> bool {
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .is_replaying()
    }

    // -----------------------------------------------------------------------
    // Built-ins
    // -----------------------------------------------------------------------

    /// The current time, recorded on first execution and replayed after.
    pub fn current_utc_time(&self) -> Result<DateTime<Utc>, WorkflowError> {
        let result = record_once(&self.journal, CURRENT_UTC_TIME_KIND, "", || {
            TaskResult::Succeeded(Value::from(Utc::now().timestamp_millis()))
        })?;
        let millis: i64 = project_builtin(result)?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| WorkflowError::Projection(format!("timestamp {millis} out of range")))
    }

    /// A fresh id, recorded on first execution and replayed after.
    pub fn new_guid(&self) -> Result<Uuid, WorkflowError> {
        let result = record_once(&self.journal, NEW_GUID_KIND, "", || {
            TaskResult::Succeeded(Value::from(Uuid::now_v7().to_string()))
        })?;
        project_builtin(result)
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Run `f` within the current turn and record its result.
    ///
    /// The identity is the call site, so the same call site always hashes the
    /// same way. Use [`WorkflowContext::call_with`] when the call depends on
    /// arguments.
    #[track_caller]
    pub fn call<T, F, Fut>(&self, f: F) -> Task<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(TurnContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let identity = format!("call@{}", call_site(Location::caller()));
        Task::call(
            Arc::clone(&self.journal),
            identity,
            Arc::new(move |turn: TurnContext| {
                let pending = f(turn);
                async move { Ok::<Value, TaskError>(serde_json::to_value(pending.await?)?) }.boxed()
            }),
        )
    }

    /// Like [`WorkflowContext::call`], with `args` folded into the identity.
    #[track_caller]
    pub fn call_with<A, T, F, Fut>(&self, args: A, f: F) -> Task<T>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A, TurnContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let site = call_site(Location::caller());
        let identity = format!("call@{site}:{}", self.encode(&args));
        Task::call(
            Arc::clone(&self.journal),
            identity,
            Arc::new(move |turn: TurnContext| {
                let pending = f(args.clone(), turn);
                async move { Ok::<Value, TaskError>(serde_json::to_value(pending.await?)?) }.boxed()
            }),
        )
    }

    /// Send an activity to the user and record the transport's response.
    #[track_caller]
    pub fn send_activity(&self, activity: impl Into<Activity>) -> Task<ResourceResponse> {
        self.call_with(activity.into(), |activity, turn: TurnContext| async move {
            Ok::<_, TaskError>(turn.send_activity(activity).await?)
        })
    }

    // -----------------------------------------------------------------------
    // Suspending tasks
    // -----------------------------------------------------------------------

    /// Begin `dialog_id` as a child and resume with its result.
    pub fn call_dialog<T>(&self, dialog_id: &str, options: Option<Value>) -> Task<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let encoded = match &options {
            Some(options) => self.encode(options),
            None => "null".to_string(),
        };
        let identity = format!("dialog:{dialog_id}:{encoded}");
        let child = dialog_id.to_string();
        Task::suspending(
            Arc::clone(&self.journal),
            TaskKind::DialogCall,
            identity,
            Box::new(move |turn: TurnContext| {
                async move { turn.begin_dialog(&child, options).await }.boxed()
            }),
            Arc::new(|_turn: TurnContext, result: Option<Value>| {
                async move { Ok::<Value, TaskError>(result.unwrap_or(Value::Null)) }.boxed()
            }),
        )
    }

    /// Run a prompt dialog with the given prompt and choices.
    pub fn prompt<T>(
        &self,
        dialog_id: &str,
        prompt: impl Into<PromptOptions>,
        choices: impl IntoIterator<Item = Choice>,
    ) -> Task<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut options = prompt.into();
        options.choices.extend(choices);
        let options = serde_json::to_value(&options)
            .map_err(|e| self.fault(WorkflowError::State(e.to_string())))
            .ok();
        self.call_dialog(dialog_id, options)
    }

    /// Sign the user in through `oauth_dialog_id`, then run `f` with the token.
    ///
    /// A missing token rejects the task with [`WorkflowError::Workflow`],
    /// which the default retry filter does not retry.
    pub fn call_as_user<T, F, Fut>(&self, oauth_dialog_id: &str, f: F) -> Task<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(String, TurnContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.call_dialog::<Option<TokenResponse>>(oauth_dialog_id, None)
            .then_async(move |response, turn| {
                let f = Arc::clone(&f);
                let token = response.map(|r| r.token).filter(|t| !t.is_empty());
                let run: BoxFuture<'static, Result<T, TaskError>> = match token {
                    Some(token) => f(token, turn).boxed(),
                    None => async { Err::<T, TaskError>(TaskError::workflow(SIGN_IN_FAILED)) }.boxed(),
                };
                run
            })
    }

    /// Wait for the user's next inbound activity.
    pub fn receive_activity(&self) -> Task<Activity> {
        Task::suspending(
            Arc::clone(&self.journal),
            TaskKind::ReceiveActivity,
            RECEIVE_ACTIVITY_IDENTITY.to_string(),
            Box::new(|_turn: TurnContext| {
                async { Ok::<_, WorkflowError>(DialogTurnResult::waiting()) }.boxed()
            }),
            Arc::new(|turn: TurnContext, _result: Option<Value>| {
                async move { Ok::<Value, TaskError>(serde_json::to_value(turn.activity())?) }
                    .boxed()
            }),
        )
    }

    /// Start this workflow over with new options and an empty history.
    pub fn restart(&self, options: O) -> RestartTask
    where
        O: Serialize,
    {
        let encoded = serde_json::to_value(&options)
            .map_err(|e| self.fault(WorkflowError::State(e.to_string())))
            .unwrap_or(Value::Null);
        let identity = format!("restart:{encoded}");
        let dialog_id = Arc::clone(&self.dialog_id);
        RestartTask::new(
            Arc::clone(&self.journal),
            identity,
            Box::new(move |turn: TurnContext| {
                async move { turn.replace_dialog(&dialog_id, Some(encoded)).await }.boxed()
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Bound functions
    // -----------------------------------------------------------------------

    /// Bind `f` to history: the first live call is recorded, replays return
    /// the recorded value.
    #[track_caller]
    pub fn bind<A, R, F>(&self, f: F) -> BoundFn<A, R>
    where
        A: Serialize + 'static,
        R: Serialize + DeserializeOwned + 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let site = call_site(Location::caller());
        BoundFn::new(
            Arc::clone(&self.journal),
            bound_kind::<F>(),
            site,
            Arc::new(move |args: A| Ok::<Value, TaskError>(serde_json::to_value(f(args))?)),
            decode(),
        )
    }

    /// Like [`WorkflowContext::bind`] for fallible functions. Failures are
    /// recorded and returned again on replay.
    #[track_caller]
    pub fn try_bind<A, R, F>(&self, f: F) -> BoundFn<A, R>
    where
        A: Serialize + 'static,
        R: Serialize + DeserializeOwned + 'static,
        F: Fn(A) -> Result<R, TaskError> + Send + Sync + 'static,
    {
        let site = call_site(Location::caller());
        BoundFn::new(
            Arc::clone(&self.journal),
            bound_kind::<F>(),
            site,
            Arc::new(move |args: A| Ok::<Value, TaskError>(serde_json::to_value(f(args)?)?)),
            decode(),
        )
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Serialize part of an identity. A failure is a fault for the whole run.
    fn encode(&self, value: &impl Serialize) -> String {
        serde_json::to_string(value).unwrap_or_else(|e| {
            self.fault(WorkflowError::State(format!("cannot encode task identity: {e}")));
            String::new()
        })
    }

    fn fault(&self, err: WorkflowError) {
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .record_fault(err);
    }
}

fn call_site(location: &Location<'_>) -> String {
    format!(
        "{}:{}:{}",
        location.file(),
        location.line(),
        location.column()
    )
}

fn project_builtin<T: DeserializeOwned>(result: TaskResult) -> Result<T, WorkflowError> {
    let value = recorded_value(result)?;
    serde_json::from_value(value).map_err(|e| WorkflowError::Projection(e.to_string()))
}
