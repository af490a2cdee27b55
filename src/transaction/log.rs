// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::TransactionId;
use crate::{EventKind, Timestamp};
use std::cell::{Cell, Ref, RefCell};

/// One operation observed on a member of a [`DatasetTransaction`](super::DatasetTransaction).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct LogEntry {
    pub transaction_id: TransactionId,
    /// Position of the entry in its log, starting at 0.
    pub operation_id: u64,
    pub operation: EventKind,
    pub time: Timestamp,
}

/// An append-only list of [`LogEntry`]s, shared by the listeners that feed it.
#[derive(Debug, Default)]
pub(crate) struct OperationLog {
    entries: RefCell<Vec<LogEntry>>,
    next_operation: Cell<u64>,
}

impl OperationLog {
    pub(crate) fn append(&self, transaction_id: TransactionId, operation: EventKind) {
        let operation_id = self.next_operation.get();
        self.next_operation.set(operation_id + 1);
        tracing::trace!(transaction = %transaction_id, operation_id, %operation, "logged");
        self.entries.borrow_mut().push(LogEntry {
            transaction_id,
            operation_id,
            operation,
            time: Timestamp::now(),
        });
    }

    pub(crate) fn entries(&self) -> Ref<'_, [LogEntry]> {
        Ref::map(self.entries.borrow(), Vec::as_slice)
    }
}
