// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # deltatx: Delta-Buffered Transactions over Shared Records
//!
//! This crate lets you edit a key-value [`Record`] speculatively. A [`Transaction`] records
//! changes as a [`Delta`] (pending writes and pending deletions) without touching the record,
//! exposes the record *as it would be* with those changes applied, and either commits them in
//! one step or throws them away.
//!
//! The primary goal is to make it cheap to try something out on live data and back out of it:
//! a form being edited, a batch of rows being prepared, a change that should revert on its own
//! unless confirmed within a deadline.
//!
//! ## Core Concepts
//!
//! - [`Record`]: a flat mapping from string keys to [`Value`]s. Records are shared through
//!   [`SharedRecord`] so that several transactions can target the same one.
//! - [`Delta`]: what a transaction would change. A write that puts back the value the record
//!   already holds is squashed, so a delta never contains no-op writes.
//! - [`Transaction`]: a delta bound to one record, with read/write/delete operations that go
//!   through the effective view, `commit` and `rollback`, events, and timeouts.
//! - [`DatasetTransaction`]: one transaction per record of a dataset, with addressed or
//!   fan-out operations and an operation log.
//! - [`EventLoop`]: a cooperative, single-threaded scheduler that runs armed timeouts.
//!
//! ## Getting Started
//!
//! ```rust
//! use deltatx::{EventKind, RecordingListener, Transaction, record};
//!
//! // 1. SETUP
//! let record = record! { "name" => "Rene", "surname" => "Descartes" }.into_shared();
//! let tx = Transaction::new(record.clone());
//! let recorder = RecordingListener::new();
//! tx.on(EventKind::Get, recorder.listener());
//!
//! // 2. SPECULATE
//! // Reads see the pending write, the record does not.
//! tx.set("name", "Aristotle")?;
//! assert_eq!(tx.get("name")?.unwrap(), "Aristotle");
//! assert_eq!(record.borrow().get("name").unwrap(), "Rene");
//!
//! // 3. BACK OUT
//! tx.rollback()?;
//! assert_eq!(tx.get("name")?.unwrap(), "Rene");
//!
//! // Every read fired a `get` event.
//! assert_eq!(recorder.seen(), ["get name", "get name"]);
//! # Ok::<(), deltatx::TransactionError>(())
//! ```
//!
//! See the [`transaction`] module documentation for the exact semantics, timeouts and datasets.
//!
//! ## Concurrency
//!
//! Everything here is single-threaded. Records, transactions and the event loop are built on
//! `Rc` and `RefCell` and are neither `Send` nor `Sync`. Concurrent transactions over the same
//! record are concurrent only in the sense of being interleaved: the last one to commit wins,
//! and no conflict is reported.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Lifecycle steps are logged at `debug`, scheduler
//! internals at `trace`. Failing event listeners and timeouts that fire on a stopped
//! transaction are logged at `warn`.
//!
//! ## Features
//!
//! - `json`: Enables conversion of values, records and transactions to `serde_json::Value`.
//!   This feature is enabled by default.
//! - `serde`: Provides `serde` support for values, records, log entries and configuration.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for values and records, useful for
//!   property-based testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

pub mod config;
pub use config::{TimeoutPolicy, TransactionConfig};
mod error;
pub use error::{ListenerError, TransactionError};
pub mod event;
pub use event::{Event, EventKind, RecordingListener, Resolution, TimeoutEvent};
#[cfg(feature = "json")]
mod json;
/// Macros usable for tests and initialization
pub mod macros;
mod record;
pub use record::{Record, SharedRecord};
pub mod scheduler;
pub use scheduler::{EventLoop, TimerHandle};
pub mod timestamp;
pub use timestamp::Timestamp;
/// Delta-buffered transactions over records and datasets.
///
/// See [`transaction`] module documentation for details and examples.
pub mod transaction;
pub use transaction::{DatasetTransaction, Delta, Transaction, TransactionId};
mod value;
pub use value::Value;

#[cfg(any(test, feature = "arbitrary"))]
mod test_util;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes all hash-based data structures behave deterministically.
///
/// This should only be enabled for testing, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
///
/// Should be used internally and for testing.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

/// Create a random state for a hashmap.
/// If `enable_determinism` has been used, this will return a deterministic
/// decidedly non-random RandomState, useful in tests.
#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

/// This is a small wrapper around the ahash RandomState used by records and deltas.
/// This allows us to easily switch to a non-random RandomState for use in tests.
#[derive(Clone)]
pub struct RecordRandomState {
    inner: RandomState,
}

// Falls back on a regular ahash::RandomState except when 'enable_determinism' has been called.
impl Default for RecordRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for RecordRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}

impl std::fmt::Debug for RecordRandomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRandomState").finish_non_exhaustive()
    }
}
