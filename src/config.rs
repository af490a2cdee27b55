// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Per-transaction configuration.
//!
//! The defaults keep armed timeouts alive across explicit resolution and across
//! [`stop`](crate::Transaction::stop): a timeout only goes away when it fires, when it is re-armed
//! or when it is cancelled explicitly. Both can be tightened through [`TimeoutPolicy`].

/// Decides when an armed timeout is cancelled implicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeoutPolicy {
    /// Cancel an armed timeout when the transaction is committed or rolled back explicitly.
    pub cancel_on_resolve: bool,
    /// Cancel an armed timeout when the transaction is stopped.
    ///
    /// Without this, a timeout that fires after `stop` finds an inactive transaction; its
    /// resolution fails, is logged, and neither the callback nor the `timeout` event fire.
    pub cancel_on_stop: bool,
}

/// Options for a [`Transaction`](crate::Transaction).
///
/// # Example
///
/// ```
/// use deltatx::{Record, Transaction, TransactionConfig};
///
/// let config = TransactionConfig::default()
///     .with_cancel_on_resolve(true)
///     .with_cancel_on_stop(true);
/// let tx = Transaction::with_config(Record::new().into_shared(), None, config);
/// assert!(tx.config().timeout.cancel_on_stop);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransactionConfig {
    pub timeout: TimeoutPolicy,
}

impl TransactionConfig {
    pub fn with_cancel_on_resolve(mut self, cancel: bool) -> Self {
        self.timeout.cancel_on_resolve = cancel;
        self
    }

    pub fn with_cancel_on_stop(mut self, cancel: bool) -> Self {
        self.timeout.cancel_on_stop = cancel;
        self
    }
}
