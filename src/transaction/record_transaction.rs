// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Delta, KeyDescriptor};
use crate::{
    EventLoop, ListenerError, Record, SharedRecord, TimerHandle, TransactionConfig,
    TransactionError, Value,
    event::{self, Event, EventKind, Listener, Listeners, Resolution, TimeoutEvent},
};
use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

/// Identifies a transaction, typically its position within a
/// [`DatasetTransaction`](super::DatasetTransaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

struct State {
    delta: Delta,
    active: bool,
    timeout: Option<TimerHandle>,
}

struct Shared {
    id: Option<TransactionId>,
    record: SharedRecord,
    config: TransactionConfig,
    state: RefCell<State>,
    listeners: RefCell<Listeners>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // the task only holds a weak reference, but there is no point in keeping it queued
        if let Some(timeout) = self.state.get_mut().timeout.take() {
            timeout.cancel();
        }
    }
}

/// A speculative view over a [`Record`].
///
/// Writes and deletes are buffered in a [`Delta`] and only reach the record on
/// [`commit`](Self::commit); [`rollback`](Self::rollback) discards them. Reads see the record
/// with the pending changes applied on top.
///
/// The record is shared: every transaction cloned off this one with
/// [`try_clone`](Self::try_clone) wraps the same record, each with its own copy of the pending
/// changes. Whoever commits last wins.
///
/// All operations take `&self` and the whole type is single-threaded (`!Send`). Event listeners
/// run synchronously once the operation that fired them has completed, so they may freely call
/// back into the transaction.
///
/// # Example
///
/// ```
/// use deltatx::{Record, Transaction};
///
/// let record = [("name", "Rene"), ("surname", "Descartes")]
///     .into_iter()
///     .collect::<Record>()
///     .into_shared();
/// let tx = Transaction::new(record.clone());
///
/// tx.set("name", "Aristotle")?;
/// assert_eq!(tx.get("name")?.unwrap(), "Aristotle");
/// assert_eq!(record.borrow().get("name").unwrap(), "Rene");
///
/// tx.commit()?;
/// assert_eq!(record.borrow().get("name").unwrap(), "Aristotle");
/// assert!(tx.delta().is_empty());
/// # Ok::<(), deltatx::TransactionError>(())
/// ```
pub struct Transaction {
    shared: Rc<Shared>,
}

impl Transaction {
    /// Starts a transaction over `record`.
    pub fn new(record: SharedRecord) -> Self {
        Self::with_config(record, None, TransactionConfig::default())
    }

    /// Starts a transaction over `record` that carries `id` in its events and log entries.
    pub fn with_id(record: SharedRecord, id: impl Into<TransactionId>) -> Self {
        Self::with_config(record, Some(id.into()), TransactionConfig::default())
    }

    pub fn with_config(
        record: SharedRecord,
        id: Option<TransactionId>,
        config: TransactionConfig,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                id,
                record,
                config,
                state: RefCell::new(State {
                    delta: Delta::new(),
                    active: true,
                    timeout: None,
                }),
                listeners: RefCell::new(Listeners::default()),
            }),
        }
    }

    pub fn id(&self) -> Option<TransactionId> {
        self.shared.id
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.shared.config
    }

    /// The record this transaction commits into.
    pub fn record(&self) -> SharedRecord {
        Rc::clone(&self.shared.record)
    }

    /// `false` once [`stop`](Self::stop) has been called.
    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().active
    }

    /// A copy of the pending changes.
    pub fn delta(&self) -> Delta {
        self.shared.state.borrow().delta.clone()
    }

    /// Reads the effective value of `key`.
    ///
    /// Fires [`Event::Get`].
    pub fn get(&self, key: &str) -> Result<Option<Value>, TransactionError> {
        let value = self.with_view(|delta, record| delta.read(record, key).cloned())?;
        self.emit_with(EventKind::Get, || Event::Get {
            key: key.to_string(),
        });
        Ok(value)
    }

    /// Buffers a write of `value` to `key`.
    ///
    /// Writing the value the record already holds squashes any pending write for `key`. Any
    /// pending deletion of `key` is dropped either way. Fires [`Event::Set`].
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), TransactionError> {
        let value = value.into();
        self.ensure_active()?;
        {
            let mut state = self.shared.state.borrow_mut();
            let record = self.shared.record.borrow();
            state.delta.write(&record, key, value.clone());
        }
        self.emit_with(EventKind::Set, || Event::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Buffers the deletion of `key`.
    ///
    /// Returns `Ok(false)` without firing anything if `key` is already pending deletion.
    /// Otherwise fires [`Event::Delete`].
    pub fn delete(&self, key: &str) -> Result<bool, TransactionError> {
        self.ensure_active()?;
        let deleted = self.shared.state.borrow_mut().delta.delete(key);
        if deleted {
            self.emit_with(EventKind::Delete, || Event::Delete {
                key: key.to_string(),
            });
        }
        Ok(deleted)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool, TransactionError> {
        self.with_view(|delta, record| delta.read(record, key).is_some())
    }

    /// The keys of the effective view, each listed once, pending deletions excluded.
    pub fn keys(&self) -> Result<Vec<String>, TransactionError> {
        self.with_view(|delta, record| delta.keys(record))
    }

    /// Presence, effective value and origin of `key`. Does not fire [`Event::Get`].
    pub fn describe(&self, key: &str) -> Result<Option<KeyDescriptor>, TransactionError> {
        self.with_view(|delta, record| delta.describe(record, key))
    }

    /// The effective view materialized as a standalone record.
    pub fn snapshot(&self) -> Result<Record, TransactionError> {
        self.with_view(|delta, record| delta.effective(record))
    }

    /// Applies pending deletions, then pending writes, to the record and clears them.
    ///
    /// Fires [`Event::Commit`] with the record as it is after the commit, also when nothing was
    /// pending.
    pub fn commit(&self) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let delta = std::mem::take(&mut self.shared.state.borrow_mut().delta);
        let changes = delta.len();
        let record = {
            let mut record = self.shared.record.borrow_mut();
            delta.apply_to(&mut record);
            record.clone()
        };
        tracing::debug!(transaction = ?self.id(), changes, "committed");
        if self.shared.config.timeout.cancel_on_resolve {
            self.cancel_timeout();
        }
        self.emit_with(EventKind::Commit, || Event::Commit { record });
        Ok(())
    }

    /// Drops all pending changes. The record is left untouched.
    ///
    /// Fires [`Event::Rollback`], also when nothing was pending.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let discarded = {
            let mut state = self.shared.state.borrow_mut();
            let discarded = state.delta.len();
            state.delta.clear();
            discarded
        };
        tracing::debug!(transaction = ?self.id(), discarded, "rolled back");
        if self.shared.config.timeout.cancel_on_resolve {
            self.cancel_timeout();
        }
        self.emit_with(EventKind::Rollback, || Event::Rollback);
        Ok(())
    }

    /// Starts a new transaction over the same record, with a copy of the pending changes.
    ///
    /// The copy keeps this transaction's id and configuration, but not its listeners or its
    /// timeout. Pending changes made on either side afterwards are invisible to the other.
    /// Fires [`Event::Clone`] on this transaction.
    pub fn try_clone(&self) -> Result<Transaction, TransactionError> {
        self.ensure_active()?;
        let delta = self.delta();
        let clone = Self::with_config(self.record(), self.id(), self.shared.config);
        clone.shared.state.borrow_mut().delta = delta;
        self.emit_with(EventKind::Clone, || Event::Clone);
        Ok(clone)
    }

    /// Registers `listener` for the event called `event`.
    ///
    /// `event` is usually an [`EventKind`], but any name is accepted. Listeners for names that
    /// are not an [`EventKind`] are kept and never invoked.
    pub fn on(&self, event: impl AsRef<str>, listener: impl Fn(&Event) + 'static) {
        self.on_listener(
            event.as_ref(),
            Rc::new(move |e: &Event| {
                listener(e);
                Ok::<(), ListenerError>(())
            }),
        );
    }

    /// Like [`on`](Self::on), for a listener that can fail.
    ///
    /// An error is logged and otherwise ignored; it neither aborts the operation that fired the
    /// event nor keeps later listeners from running.
    pub fn try_on(
        &self,
        event: impl AsRef<str>,
        listener: impl Fn(&Event) -> Result<(), ListenerError> + 'static,
    ) {
        self.on_listener(event.as_ref(), Rc::new(listener));
    }

    pub(crate) fn on_listener(&self, event: &str, listener: Listener) {
        self.shared.listeners.borrow_mut().register(event, listener);
    }

    /// Arms a one-shot timeout on `event_loop` that resolves this transaction `after` from now.
    ///
    /// See [`schedule_timeout_with`](Self::schedule_timeout_with).
    pub fn schedule_timeout(
        &self,
        event_loop: &EventLoop,
        after: Duration,
        resolution: Resolution,
    ) -> Result<TimerHandle, TransactionError> {
        self.schedule_timeout_with(event_loop, after, resolution, |_| {})
    }

    /// Arms a one-shot timeout on `event_loop` that resolves this transaction `after` from now.
    ///
    /// When it fires, the transaction is committed or rolled back according to `resolution`,
    /// then `on_fire` is called, then [`Event::Timeout`] fires. Arming again before that
    /// cancels the previous timeout; at most one is ever pending per transaction.
    ///
    /// Committing or rolling back explicitly leaves the timeout armed, and so does
    /// [`stop`](Self::stop), unless the [`TimeoutPolicy`](crate::TimeoutPolicy) says otherwise.
    pub fn schedule_timeout_with(
        &self,
        event_loop: &EventLoop,
        after: Duration,
        resolution: Resolution,
        on_fire: impl FnOnce(&TimeoutEvent) + 'static,
    ) -> Result<TimerHandle, TransactionError> {
        self.ensure_active()?;
        self.cancel_timeout();
        let weak = self.downgrade();
        let handle = event_loop.schedule(after, move || {
            let Some(tx) = weak.upgrade() else {
                return;
            };
            tx.shared.state.borrow_mut().timeout = None;
            let fired = TimeoutEvent { resolution, after };
            if tx.resolve_on_timeout(resolution) {
                on_fire(&fired);
                tx.emit_timeout(fired);
            }
        });
        tracing::debug!(transaction = ?self.id(), ?after, %resolution, "armed timeout");
        self.shared.state.borrow_mut().timeout = Some(handle.clone());
        Ok(handle)
    }

    /// Disarms the pending timeout, if any. Returns whether there was one.
    pub fn cancel_timeout(&self) -> bool {
        let timeout = self.shared.state.borrow_mut().timeout.take();
        match timeout {
            Some(timeout) => {
                let cancelled = timeout.cancel();
                tracing::debug!(transaction = ?self.id(), "cancelled timeout");
                cancelled
            }
            None => false,
        }
    }

    pub fn has_pending_timeout(&self) -> bool {
        self.shared
            .state
            .borrow()
            .timeout
            .as_ref()
            .is_some_and(TimerHandle::is_pending)
    }

    /// Permanently deactivates the transaction.
    ///
    /// Every later read, write, delete, commit, rollback or clone fails with
    /// [`TransactionError::Inactive`]. Pending changes are kept but can no longer be applied.
    /// An armed timeout stays armed unless
    /// [`TimeoutPolicy::cancel_on_stop`](crate::TimeoutPolicy::cancel_on_stop) is set; when it
    /// fires it finds the transaction inactive and does nothing but log.
    pub fn stop(&self) {
        self.shared.state.borrow_mut().active = false;
        tracing::debug!(transaction = ?self.id(), "stopped");
        if self.shared.config.timeout.cancel_on_stop {
            self.cancel_timeout();
        }
    }

    /// Commits or rolls back on behalf of a fired timeout. Returns `false` if the transaction
    /// could not be resolved.
    pub(crate) fn resolve_on_timeout(&self, resolution: Resolution) -> bool {
        let resolved = match resolution {
            Resolution::Commit => self.commit(),
            Resolution::Rollback => self.rollback(),
        };
        match resolved {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    transaction = ?self.id(),
                    %resolution,
                    %error,
                    "timeout fired on a transaction that can no longer be resolved"
                );
                false
            }
        }
    }

    pub(crate) fn emit_timeout(&self, fired: TimeoutEvent) {
        self.emit_with(EventKind::Timeout, || Event::Timeout(fired));
    }

    pub(crate) fn downgrade(&self) -> WeakTransaction {
        WeakTransaction {
            shared: Rc::downgrade(&self.shared),
        }
    }

    fn ensure_active(&self) -> Result<(), TransactionError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransactionError::Inactive { id: self.id() })
        }
    }

    fn with_view<T>(&self, f: impl FnOnce(&Delta, &Record) -> T) -> Result<T, TransactionError> {
        let state = self.shared.state.borrow();
        if !state.active {
            return Err(TransactionError::Inactive { id: self.id() });
        }
        let record = self.shared.record.borrow();
        Ok(f(&state.delta, &record))
    }

    /// Builds the event only if someone listens for it.
    fn emit_with(&self, kind: EventKind, event: impl FnOnce() -> Event) {
        let listeners = self.shared.listeners.borrow().for_kind(kind);
        if listeners.is_empty() {
            return;
        }
        event::dispatch(listeners, &event(), self.id());
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Transaction")
            .field("id", &self.shared.id)
            .field("active", &state.active)
            .field("record", &*self.shared.record.borrow())
            .field("delta", &state.delta)
            .field("timeout", &state.timeout)
            .finish()
    }
}

/// Formats the effective view like a [`Record`], or `<inactive>` once stopped.
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snapshot() {
            Ok(record) => write!(f, "{record}"),
            Err(_) => f.write_str("<inactive>"),
        }
    }
}

/// A non-owning reference held by scheduled timeouts.
pub(crate) struct WeakTransaction {
    shared: Weak<Shared>,
}

impl WeakTransaction {
    pub(crate) fn upgrade(&self) -> Option<Transaction> {
        self.shared.upgrade().map(|shared| Transaction { shared })
    }
}
