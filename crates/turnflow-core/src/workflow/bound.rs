//! Recorded, memoized function calls.
//!
//! A [`BoundFn`] wraps a function whose result must not change between the
//! live run and later replays (clocks, random ids, counters). The first live
//! call records its result; replays return the recorded value without calling
//! the function again. Unlike tasks, bound calls are plain synchronous calls
//! and never reach the dispatcher.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use turnflow_types::workflow::TaskResult;

use super::error::{TaskError, WorkflowError, record_error, recorded_value};
use super::journal::{SharedJournal, record_once};
use super::task::Projector;

/// History kind prefix for bound functions.
pub const BOUND_KIND_PREFIX: &str = "boundFunc_";

type BoundInvoke<A> = Arc<dyn Fn(A) -> Result<Value, TaskError> + Send + Sync>;

/// A function bound to a workflow's history.
///
/// The recorded kind is derived from the wrapped function's type; the hashed
/// identity covers the bind site and the serialized arguments.
pub struct BoundFn<A, R> {
    journal: SharedJournal,
    kind: String,
    site: String,
    invoke: BoundInvoke<A>,
    projector: Projector<R>,
}

impl<A: 'static, R: 'static> BoundFn<A, R> {
    pub(crate) fn new(
        journal: SharedJournal,
        kind: String,
        site: String,
        invoke: BoundInvoke<A>,
        projector: Projector<R>,
    ) -> Self {
        Self {
            journal,
            kind,
            site,
            invoke,
            projector,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Map the returned value without changing what is recorded.
    pub fn project<U, F>(self, mapping: F) -> BoundFn<A, U>
    where
        U: 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let inner = self.projector;
        BoundFn {
            journal: self.journal,
            kind: self.kind,
            site: self.site,
            invoke: self.invoke,
            projector: Arc::new(move |value: Value| inner(value).map(&mapping)),
        }
    }
}

impl<A: Serialize, R> BoundFn<A, R> {
    /// Call the function, or replay its recorded result.
    ///
    /// A recorded failure is returned on the live call and on every replay,
    /// as [`WorkflowError::TaskFailed`] or [`WorkflowError::Workflow`].
    pub fn call(&self, args: A) -> Result<R, WorkflowError> {
        let encoded = serde_json::to_string(&args)?;
        let hashed_identity = self
            .journal
            .lock()
            .expect("journal lock poisoned")
            .hash(&format!("{}:{}", self.site, encoded));

        let result = record_once(&self.journal, &self.kind, &hashed_identity, || {
            match (self.invoke)(args) {
                Ok(value) => TaskResult::Succeeded(value),
                Err(err) => record_error(&err),
            }
        })?;

        (self.projector)(recorded_value(result)?)
    }
}

impl<A, R> Clone for BoundFn<A, R> {
    fn clone(&self) -> Self {
        Self {
            journal: Arc::clone(&self.journal),
            kind: self.kind.clone(),
            site: self.site.clone(),
            invoke: Arc::clone(&self.invoke),
            projector: Arc::clone(&self.projector),
        }
    }
}

impl<A, R> fmt::Debug for BoundFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFn")
            .field("kind", &self.kind)
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}

/// Kind string for a bound function of type `F`.
pub(crate) fn bound_kind<F>() -> String {
    format!("{BOUND_KIND_PREFIX}{}", std::any::type_name::<F>())
}
