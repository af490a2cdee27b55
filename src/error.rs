// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::transaction::TransactionId;
use std::fmt;

/// Error returned by operations on a [`Transaction`](crate::Transaction).
///
/// Buffering a write or a delete never fails on its own. The only failure is lifecycle misuse:
/// touching a transaction after [`stop`](crate::Transaction::stop) would read or mutate through a
/// view that no longer tracks its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction was stopped and can no longer be read, written or resolved.
    Inactive { id: Option<TransactionId> },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Inactive { id: Some(id) } => {
                write!(f, "transaction {id} is no longer active")
            }
            TransactionError::Inactive { id: None } => {
                write!(f, "transaction is no longer active")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

/// The error type a fallible event listener may return.
///
/// Listener errors never reach the caller of the operation that fired the event; they are logged
/// and the remaining listeners still run.
pub type ListenerError = Box<dyn std::error::Error + 'static>;
