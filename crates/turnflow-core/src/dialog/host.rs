//! The host collaborator contract.
//!
//! The engine never touches the dialog stack, the transport, or storage
//! directly. Everything goes through a [`DialogHost`] for the current turn,
//! reached via the cloneable [`TurnContext`] handle.
//!
//! Hosts serialize turns per conversation: no two turns for the same
//! workflow instance run concurrently, so the engine takes no locks around
//! the state slot.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use turnflow_types::activity::{Activity, ResourceResponse};
use turnflow_types::dialog::DialogTurnResult;
use turnflow_types::error::HostError;

use crate::workflow::error::WorkflowError;

/// Services a dialog host offers to the dialog it is currently running.
///
/// "Current instance" always means the dialog instance on top of the stack.
/// Uses RPITIT; see [`DialogHostDyn`] for the object-safe form.
pub trait DialogHost: Send + Sync {
    /// The inbound activity this turn was started for.
    fn activity(&self) -> Activity;

    /// Id of the dialog the current instance runs, if any.
    fn active_dialog_id(&self) -> Option<String>;

    /// Read the current instance's state slot. `None` when never written.
    fn load_instance_state(&self) -> Result<Option<Value>, HostError>;

    /// Overwrite the current instance's state slot.
    fn save_instance_state(&self, state: Value) -> Result<(), HostError>;

    /// Send an outbound activity to the user.
    fn send_activity(
        &self,
        activity: Activity,
    ) -> impl Future<Output = Result<ResourceResponse, HostError>> + Send;

    /// Push a new instance of `dialog_id` and run its begin step.
    fn begin_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;

    /// Pop the current instance and resume its parent with `result`.
    fn end_dialog(
        &self,
        result: Option<Value>,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;

    /// Pop the current instance and begin `dialog_id` in its place.
    fn replace_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;
}

// ---------------------------------------------------------------------------
// Object-safe form
// ---------------------------------------------------------------------------

/// Object-safe version of [`DialogHost`] with boxed futures.
pub trait DialogHostDyn: Send + Sync {
    fn activity(&self) -> Activity;

    fn active_dialog_id(&self) -> Option<String>;

    fn load_instance_state(&self) -> Result<Option<Value>, HostError>;

    fn save_instance_state(&self, state: Value) -> Result<(), HostError>;

    fn send_activity_boxed(
        &self,
        activity: Activity,
    ) -> BoxFuture<'_, Result<ResourceResponse, HostError>>;

    fn begin_dialog_boxed<'a>(
        &'a self,
        dialog_id: &'a str,
        options: Option<Value>,
    ) -> BoxFuture<'a, Result<DialogTurnResult, WorkflowError>>;

    fn end_dialog_boxed(
        &self,
        result: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>>;

    fn replace_dialog_boxed<'a>(
        &'a self,
        dialog_id: &'a str,
        options: Option<Value>,
    ) -> BoxFuture<'a, Result<DialogTurnResult, WorkflowError>>;
}

impl<T: DialogHost> DialogHostDyn for T {
    fn activity(&self) -> Activity {
        DialogHost::activity(self)
    }

    fn active_dialog_id(&self) -> Option<String> {
        DialogHost::active_dialog_id(self)
    }

    fn load_instance_state(&self) -> Result<Option<Value>, HostError> {
        DialogHost::load_instance_state(self)
    }

    fn save_instance_state(&self, state: Value) -> Result<(), HostError> {
        DialogHost::save_instance_state(self, state)
    }

    fn send_activity_boxed(
        &self,
        activity: Activity,
    ) -> BoxFuture<'_, Result<ResourceResponse, HostError>> {
        Box::pin(self.send_activity(activity))
    }

    fn begin_dialog_boxed<'a>(
        &'a self,
        dialog_id: &'a str,
        options: Option<Value>,
    ) -> BoxFuture<'a, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.begin_dialog(dialog_id, options))
    }

    fn end_dialog_boxed(
        &self,
        result: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.end_dialog(result))
    }

    fn replace_dialog_boxed<'a>(
        &'a self,
        dialog_id: &'a str,
        options: Option<Value>,
    ) -> BoxFuture<'a, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.replace_dialog(dialog_id, options))
    }
}

// ---------------------------------------------------------------------------
// TurnContext
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle to the host serving the current turn.
///
/// Task hooks receive an owned `TurnContext` so the futures they return can
/// be `'static`.
#[derive(Clone)]
pub struct TurnContext {
    host: Arc<dyn DialogHostDyn>,
}

impl TurnContext {
    pub fn new<H: DialogHost + 'static>(host: H) -> Self {
        Self {
            host: Arc::new(host),
        }
    }

    pub fn from_arc<H: DialogHost + 'static>(host: Arc<H>) -> Self {
        Self { host }
    }

    pub fn activity(&self) -> Activity {
        self.host.activity()
    }

    pub fn active_dialog_id(&self) -> Option<String> {
        self.host.active_dialog_id()
    }

    pub fn load_instance_state(&self) -> Result<Option<Value>, HostError> {
        self.host.load_instance_state()
    }

    pub fn save_instance_state(&self, state: Value) -> Result<(), HostError> {
        self.host.save_instance_state(state)
    }

    pub async fn send_activity(
        &self,
        activity: impl Into<Activity>,
    ) -> Result<ResourceResponse, HostError> {
        self.host.send_activity_boxed(activity.into()).await
    }

    pub async fn begin_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.host.begin_dialog_boxed(dialog_id, options).await
    }

    pub async fn end_dialog(
        &self,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.host.end_dialog_boxed(result).await
    }

    pub async fn replace_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.host.replace_dialog_boxed(dialog_id, options).await
    }
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("active_dialog_id", &self.host.active_dialog_id())
            .finish()
    }
}
