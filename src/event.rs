// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Observe what happens to a transaction.
//!
//! Every read, write, delete and lifecycle step of a [`Transaction`](crate::Transaction) fires an
//! [`Event`]. Listeners are registered by event name with
//! [`Transaction::on`](crate::Transaction::on) and are invoked synchronously, in registration
//! order, after the state change they describe has been applied.
//!
//! Names outside of [`EventKind`] are accepted when registering but never fire. This lets callers
//! subscribe ahead of a feature that does not emit yet.
//!
//! A listener that returns an error does not abort the operation that fired the event, nor the
//! listeners registered after it. The failure is logged with `tracing` and dispatch moves on.
//!
//! For a testing-oriented listener, see [`RecordingListener`].
use crate::{ListenerError, Record, RecordRandomState, Value, transaction::TransactionId};
use smallvec::SmallVec;
use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc, time::Duration};

/// The recognized kinds of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventKind {
    Get,
    Set,
    Delete,
    Commit,
    Rollback,
    Clone,
    Timeout,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Get,
        EventKind::Set,
        EventKind::Delete,
        EventKind::Commit,
        EventKind::Rollback,
        EventKind::Clone,
        EventKind::Timeout,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Get => "get",
            EventKind::Set => "set",
            EventKind::Delete => "delete",
            EventKind::Commit => "commit",
            EventKind::Rollback => "rollback",
            EventKind::Clone => "clone",
            EventKind::Timeout => "timeout",
        }
    }

    /// Looks up the kind registered under `name`, if it is a recognized one.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl AsRef<str> for EventKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fired timeout resolves its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Resolution {
    Commit,
    Rollback,
}

impl Resolution {
    /// `true` maps to [`Resolution::Commit`], `false` to [`Resolution::Rollback`].
    pub fn from_commit_flag(commit: bool) -> Self {
        if commit {
            Resolution::Commit
        } else {
            Resolution::Rollback
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Commit => f.write_str("commit"),
            Resolution::Rollback => f.write_str("rollback"),
        }
    }
}

/// Describes a timeout that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEvent {
    /// What the timeout did to the transaction before this event fired.
    pub resolution: Resolution,
    /// The duration the timeout was armed with.
    pub after: Duration,
}

/// Something that happened to a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Get { key: String },
    Set { key: String, value: Value },
    Delete { key: String },
    /// Carries the record as it is right after the commit.
    Commit { record: Record },
    Rollback,
    Clone,
    Timeout(TimeoutEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Get { .. } => EventKind::Get,
            Event::Set { .. } => EventKind::Set,
            Event::Delete { .. } => EventKind::Delete,
            Event::Commit { .. } => EventKind::Commit,
            Event::Rollback => EventKind::Rollback,
            Event::Clone => EventKind::Clone,
            Event::Timeout(_) => EventKind::Timeout,
        }
    }
}

pub(crate) type Listener = Rc<dyn Fn(&Event) -> Result<(), ListenerError>>;

/// Listeners by event name.
///
/// Dispatch copies the (reference-counted) listeners out first, so a listener may register
/// further listeners or call back into the transaction that fired it.
#[derive(Default)]
pub(crate) struct Listeners {
    by_name: HashMap<String, SmallVec<[Listener; 2]>, RecordRandomState>,
}

impl Listeners {
    pub(crate) fn register(&mut self, name: &str, listener: Listener) {
        if EventKind::from_name(name).is_none() {
            tracing::debug!(event = name, "registered listener for an event that never fires");
        }
        self.by_name
            .entry(name.to_string())
            .or_default()
            .push(listener);
    }

    pub(crate) fn for_kind(&self, kind: EventKind) -> SmallVec<[Listener; 2]> {
        self.by_name
            .get(kind.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

/// Invokes every listener in order, logging and skipping over the ones that fail.
pub(crate) fn dispatch<I>(listeners: I, event: &Event, id: Option<TransactionId>)
where
    I: IntoIterator<Item = Listener>,
{
    for listener in listeners {
        if let Err(error) = listener(event) {
            tracing::warn!(
                transaction = ?id,
                event = %event.kind(),
                %error,
                "event listener failed"
            );
        }
    }
}

/// A listener that records a human readable line for every event it sees.
///
/// This is mostly useful for tests. Clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingListener {
    /// A string-representation of each event that the listener has received.
    seen: Rc<RefCell<Vec<String>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a closure suitable for [`Transaction::on`](crate::Transaction::on).
    pub fn listener(&self) -> impl Fn(&Event) + 'static {
        let seen = Rc::clone(&self.seen);
        move |event: &Event| seen.borrow_mut().push(describe(event))
    }

    /// Everything recorded so far, oldest first.
    pub fn seen(&self) -> Vec<String> {
        self.seen.borrow().clone()
    }

    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::Get { key } => format!("get {key}"),
        Event::Set { key, value } => format!("set {key} = {value}"),
        Event::Delete { key } => format!("delete {key}"),
        Event::Commit { record } => format!("commit {record}"),
        Event::Rollback => "rollback".to_string(),
        Event::Clone => "clone".to_string(),
        Event::Timeout(timeout) => format!("timeout {}", timeout.resolution),
    }
}
