//! Dialogs and the host they run under.
//!
//! A [`Dialog`] is anything a host can push onto a conversation's dialog
//! stack: workflow entry points, prompts, sign-in dialogs. Implementations
//! live here (workflows) and in turnflow-infra (prompts).

pub mod host;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use turnflow_types::dialog::DialogTurnResult;

use crate::workflow::error::WorkflowError;
use host::TurnContext;

/// A unit of conversation logic addressed by id.
///
/// Each method runs against the instance currently on top of the host's
/// stack. Uses RPITIT; see [`DialogDyn`] for the object-safe form.
pub trait Dialog: Send + Sync {
    /// Registration id, unique within a dialog set.
    fn id(&self) -> &str;

    /// A fresh instance was pushed.
    fn begin_dialog(
        &self,
        turn: TurnContext,
        options: Option<Value>,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;

    /// A new inbound activity arrived while this instance is active.
    fn continue_dialog(
        &self,
        turn: TurnContext,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;

    /// A child this instance started has ended with `result`.
    fn resume_dialog(
        &self,
        turn: TurnContext,
        result: Option<Value>,
    ) -> impl Future<Output = Result<DialogTurnResult, WorkflowError>> + Send;
}

/// Object-safe version of [`Dialog`] with boxed futures.
pub trait DialogDyn: Send + Sync {
    fn id(&self) -> &str;

    fn begin_dialog_boxed(
        &self,
        turn: TurnContext,
        options: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>>;

    fn continue_dialog_boxed(
        &self,
        turn: TurnContext,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>>;

    fn resume_dialog_boxed(
        &self,
        turn: TurnContext,
        result: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>>;
}

impl<T: Dialog> DialogDyn for T {
    fn id(&self) -> &str {
        Dialog::id(self)
    }

    fn begin_dialog_boxed(
        &self,
        turn: TurnContext,
        options: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.begin_dialog(turn, options))
    }

    fn continue_dialog_boxed(
        &self,
        turn: TurnContext,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.continue_dialog(turn))
    }

    fn resume_dialog_boxed(
        &self,
        turn: TurnContext,
        result: Option<Value>,
    ) -> BoxFuture<'_, Result<DialogTurnResult, WorkflowError>> {
        Box::pin(self.resume_dialog(turn, result))
    }
}

/// Shared, type-erased dialog as stored in a host's registry.
pub type SharedDialog = Arc<dyn DialogDyn>;
