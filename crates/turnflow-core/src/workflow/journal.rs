//! Shared bookkeeping between a running workflow and its dispatcher.
//!
//! The coroutine and the dispatcher never call each other directly. An
//! awaited task drops a [`YieldedTask`] into the journal's offer slot and
//! returns `Pending`; the dispatcher takes the offer, resolves it, and puts
//! the outcome into the delivery slot under the offer's ticket before polling
//! the coroutine again.
//!
//! The journal also owns the replay cursor over recorded history, so that
//! memoized calls (bound functions, built-ins) can be replayed inline
//! without a round trip through the dispatcher.

use std::sync::{Arc, Mutex};

use turnflow_types::workflow::{HistoryEntry, TaskResult};

use super::error::WorkflowError;
use super::hash::{IdentityHasher, Sha256IdentityHasher};
use super::task::YieldedTask;

pub(crate) type SharedJournal = Arc<Mutex<Journal>>;

pub(crate) struct Journal {
    history: Vec<HistoryEntry>,
    cursor: usize,
    resume_pending: bool,
    hasher: Arc<dyn IdentityHasher>,
    next_ticket: u64,
    offer: Option<(u64, YieldedTask)>,
    delivery: Option<(u64, TaskResult)>,
    fault: Option<WorkflowError>,
}

impl Journal {
    pub(crate) fn new(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            cursor: 0,
            resume_pending: false,
            hasher: Arc::new(Sha256IdentityHasher),
            next_ticket: 0,
            offer: None,
            delivery: None,
            fault: None,
        }
    }

    pub(crate) fn shared(self) -> SharedJournal {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn set_hasher(&mut self, hasher: Arc<dyn IdentityHasher>) {
        self.hasher = hasher;
    }

    pub(crate) fn hash(&self, identity: &str) -> String {
        self.hasher.hash_identity(identity)
    }

    /// Rewind for a new run of the coroutine.
    pub(crate) fn rewind(&mut self, resume_pending: bool) {
        self.cursor = 0;
        self.resume_pending = resume_pending;
        self.offer = None;
        self.delivery = None;
        self.fault = None;
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn len(&self) -> usize {
        self.history.len()
    }

    /// True while recorded outcomes are still being fed back, including the
    /// outstanding task of a resumed suspension.
    pub(crate) fn is_replaying(&self) -> bool {
        self.cursor < self.history.len() || self.resume_pending
    }

    pub(crate) fn finish_resume(&mut self) {
        self.resume_pending = false;
    }

    pub(crate) fn take_history(&mut self) -> Vec<HistoryEntry> {
        self.cursor = 0;
        std::mem::take(&mut self.history)
    }

    // -----------------------------------------------------------------------
    // Offer / delivery
    // -----------------------------------------------------------------------

    /// Hand a task to the dispatcher. Only one task may be outstanding.
    pub(crate) fn offer(&mut self, task: YieldedTask) -> Result<u64, WorkflowError> {
        if let Some((_, outstanding)) = &self.offer {
            let err = WorkflowError::UnsupportedAwait(format!(
                "'{}' awaited while '{}' is still outstanding; workflow tasks must be awaited one at a time",
                task.kind, outstanding.kind
            ));
            self.record_fault(err.clone());
            return Err(err);
        }
        self.next_ticket += 1;
        self.offer = Some((self.next_ticket, task));
        Ok(self.next_ticket)
    }

    pub(crate) fn take_offer(&mut self) -> Option<(u64, YieldedTask)> {
        self.offer.take()
    }

    pub(crate) fn deliver(&mut self, ticket: u64, result: TaskResult) {
        self.delivery = Some((ticket, result));
    }

    /// Take the outcome for `ticket`, leaving deliveries for other tickets.
    pub(crate) fn take_delivery(&mut self, ticket: u64) -> Option<TaskResult> {
        match &self.delivery {
            Some((delivered, _)) if *delivered == ticket => self.delivery.take().map(|(_, r)| r),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Faults
    // -----------------------------------------------------------------------

    /// Remember the first fault of the run. Faults abort the turn even when
    /// workflow code swallows the error it was handed.
    pub(crate) fn record_fault(&mut self, err: WorkflowError) {
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }

    pub(crate) fn take_fault(&mut self) -> Option<WorkflowError> {
        self.fault.take()
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// If history has an unread entry, check it against `(kind, hashed)` and
    /// return its result. `None` once history is exhausted.
    pub(crate) fn replay_next(
        &mut self,
        kind: &str,
        hashed_identity: &str,
    ) -> Result<Option<TaskResult>, WorkflowError> {
        let Some(entry) = self.history.get(self.cursor) else {
            return Ok(None);
        };
        if entry.kind != kind {
            let err = WorkflowError::nondeterminism(format!(
                "history entry {} was recorded as '{}' but the workflow issued '{}'",
                self.cursor, entry.kind, kind
            ));
            self.record_fault(err.clone());
            return Err(err);
        }
        if entry.hashed_identity != hashed_identity {
            let err = WorkflowError::nondeterminism(format!(
                "history entry {} ('{}') has a different identity than the task the workflow issued",
                self.cursor, kind
            ));
            self.record_fault(err.clone());
            return Err(err);
        }
        let result = entry.result.clone();
        self.cursor += 1;
        Ok(Some(result))
    }

    /// Record a new outcome. Only legal once replay has caught up.
    pub(crate) fn append(
        &mut self,
        kind: &str,
        hashed_identity: &str,
        result: TaskResult,
    ) -> Result<(), WorkflowError> {
        if self.cursor != self.history.len() || self.resume_pending {
            let err = WorkflowError::nondeterminism(format!(
                "attempted to record '{}' at position {} of {} before replay finished",
                kind,
                self.cursor,
                self.history.len()
            ));
            self.record_fault(err.clone());
            return Err(err);
        }
        self.history.push(HistoryEntry {
            kind: kind.to_string(),
            hashed_identity: hashed_identity.to_string(),
            result,
        });
        self.cursor += 1;
        Ok(())
    }
}

/// Replay a memoized call, or run `produce` and record its outcome.
///
/// The journal lock is released while `produce` runs.
pub(crate) fn record_once(
    journal: &SharedJournal,
    kind: &str,
    hashed_identity: &str,
    produce: impl FnOnce() -> TaskResult,
) -> Result<TaskResult, WorkflowError> {
    let replayed = {
        let mut guard = journal.lock().expect("journal lock poisoned");
        guard.replay_next(kind, hashed_identity)?
    };
    if let Some(result) = replayed {
        tracing::debug!(kind, "replayed memoized call");
        return Ok(result);
    }

    let result = produce();
    journal
        .lock()
        .expect("journal lock poisoned")
        .append(kind, hashed_identity, result.clone())?;
    tracing::debug!(kind, success = result.is_success(), "recorded memoized call");
    Ok(result)
}
