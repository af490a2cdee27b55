// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Speculative edits over shared records.
//!
//! A [`Transaction`] wraps a [`SharedRecord`](crate::SharedRecord) and buffers changes to it in a
//! [`Delta`] until they are committed or rolled back. Reads go through the *effective view*:
//! the record with the pending changes applied on top.
//!
//! # Example
//!
//! ```
//! use deltatx::{EventKind, RecordingListener, Transaction, record};
//!
//! let record = record! { "name" => "Rene", "surname" => "Descartes" }.into_shared();
//! let tx = Transaction::new(record.clone());
//! let recorder = RecordingListener::new();
//! tx.on(EventKind::Commit, recorder.listener());
//!
//! tx.set("name", "Aristotle")?;
//! tx.delete("surname")?;
//! assert_eq!(tx.to_string(), r#"{"name":"Aristotle"}"#);
//! assert_eq!(record.borrow().to_string(), r#"{"name":"Rene","surname":"Descartes"}"#);
//!
//! tx.commit()?;
//! assert_eq!(recorder.seen(), [r#"commit {"name":"Aristotle"}"#]);
//! # Ok::<(), deltatx::TransactionError>(())
//! ```
//!
//! # Semantics
//!
//! - **Squashing**: writing the value the record already holds removes the pending write, so a
//!   delta only ever contains real changes.
//! - **Deletes win until rewritten**: deleting a key drops its pending write; writing it again
//!   drops the pending deletion.
//! - **Commit** applies deletions first, then writes, and empties the delta. The transaction
//!   stays usable.
//! - **Last commit wins**: transactions cloned with [`Transaction::try_clone`] share the record
//!   but not their deltas. There is no conflict detection.
//! - **Stop** is final. Everything but introspection of the configuration fails afterwards with
//!   [`TransactionError::Inactive`](crate::TransactionError::Inactive).
//!
//! # Timeouts
//!
//! [`Transaction::schedule_timeout`] arms a one-shot action on an
//! [`EventLoop`](crate::EventLoop) that commits or rolls back the transaction once the loop
//! reaches its deadline. Only one timeout is pending per transaction; arming again replaces it.
//!
//! ```
//! use deltatx::{EventLoop, Resolution, Transaction, record};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let record = record! { "name" => "Rene" }.into_shared();
//! let tx = Transaction::new(record.clone());
//!
//! tx.set("name", "Aristotle")?;
//! tx.schedule_timeout(&event_loop, Duration::from_millis(10), Resolution::Rollback)?;
//!
//! event_loop.advance(Duration::from_millis(10));
//! assert!(tx.delta().is_empty());
//! assert_eq!(record.borrow().get("name").unwrap(), "Rene");
//! # Ok::<(), deltatx::TransactionError>(())
//! ```
//!
//! # Datasets
//!
//! [`DatasetTransaction`] groups one transaction per record and logs every event its members
//! fire as a [`LogEntry`].

mod dataset_transaction;
mod delta;
mod log;
mod record_transaction;

pub use dataset_transaction::DatasetTransaction;
pub use delta::{Delta, KeyDescriptor, Source};
pub use log::LogEntry;
pub use record_transaction::{Transaction, TransactionId};
