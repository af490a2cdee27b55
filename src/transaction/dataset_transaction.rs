// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{LogEntry, Transaction, TransactionId, log::OperationLog};
use crate::{
    EventLoop, ListenerError, Record, SharedRecord, TimerHandle, TransactionConfig,
    TransactionError, Value,
    event::{Event, EventKind, Listener, Resolution, TimeoutEvent},
};
use std::{
    cell::{Ref, RefCell},
    fmt,
    rc::Rc,
    time::Duration,
};

/// An ordered group of [`Transaction`]s, one per record, addressed by [`TransactionId`].
///
/// Operations take an optional id. Without one they fan out to every member in order; with one
/// they reach only the member carrying that id, and an id that matches no member makes them a
/// no-op.
///
/// Every event fired by a member is appended to the dataset's [log](Self::log).
///
/// # Example
///
/// ```
/// use deltatx::{DatasetTransaction, EventKind, record, transaction::TransactionId};
///
/// let dataset = DatasetTransaction::new([
///     record! { "name" => "Rene" },
///     record! { "name" => "Marcus" },
/// ]);
/// dataset.update("city", "Rome", Some(TransactionId(1)))?;
/// dataset.commit(None)?;
///
/// assert_eq!(dataset.to_string(), r#"[{"name":"Rene"},{"city":"Rome","name":"Marcus"}]"#);
/// let operations: Vec<_> = dataset.log().iter().map(|entry| entry.operation).collect();
/// assert_eq!(operations, [EventKind::Set, EventKind::Commit, EventKind::Commit]);
/// # Ok::<(), deltatx::TransactionError>(())
/// ```
pub struct DatasetTransaction {
    members: Vec<Transaction>,
    log: Rc<OperationLog>,
    config: TransactionConfig,
    timeout: RefCell<Option<TimerHandle>>,
}

impl DatasetTransaction {
    /// Starts one transaction per record, with ids counting up from 0.
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self::from_shared(
            records.into_iter().map(Record::into_shared),
            TransactionConfig::default(),
        )
    }

    /// Like [`new`](Self::new), over records that may also be shared with other transactions.
    ///
    /// `config` applies to every member and to the dataset timeout.
    pub fn from_shared(
        records: impl IntoIterator<Item = SharedRecord>,
        config: TransactionConfig,
    ) -> Self {
        let members = records
            .into_iter()
            .zip(0..)
            .map(|(record, id)| Transaction::with_config(record, Some(TransactionId(id)), config))
            .collect();
        Self::from_members(members, config)
    }

    fn from_members(members: Vec<Transaction>, config: TransactionConfig) -> Self {
        let log = Rc::new(OperationLog::default());
        for (index, member) in (0..).zip(&members) {
            let id = member.id().unwrap_or(TransactionId(index));
            for kind in EventKind::ALL {
                let log = Rc::clone(&log);
                member.on_listener(
                    kind.as_str(),
                    Rc::new(move |_: &Event| {
                        log.append(id, kind);
                        Ok::<(), ListenerError>(())
                    }),
                );
            }
        }
        tracing::debug!(members = members.len(), "started dataset transaction");
        Self {
            members,
            log,
            config,
            timeout: RefCell::new(None),
        }
    }

    pub fn config(&self) -> TransactionConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.members
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.members.iter()
    }

    pub fn find_by_id(&self, id: TransactionId) -> Option<&Transaction> {
        self.members.iter().find(|member| member.id() == Some(id))
    }

    /// Every event fired by a member so far, in the order they fired.
    pub fn log(&self) -> Ref<'_, [LogEntry]> {
        self.log.entries()
    }

    /// Buffers a write of `value` to `key` on the addressed members.
    pub fn update(
        &self,
        key: &str,
        value: impl Into<Value>,
        id: Option<TransactionId>,
    ) -> Result<(), TransactionError> {
        let value = value.into();
        for member in self.addressed(id) {
            member.set(key, value.clone())?;
        }
        Ok(())
    }

    /// Buffers the deletion of `key` on the addressed members.
    pub fn delete(&self, key: &str, id: Option<TransactionId>) -> Result<(), TransactionError> {
        for member in self.addressed(id) {
            member.delete(key)?;
        }
        Ok(())
    }

    /// Commits the addressed members in order.
    ///
    /// Committing every member (`id` is `None`) also disarms the dataset timeout when the config
    /// asks for [`cancel_on_resolve`](crate::TimeoutPolicy::cancel_on_resolve).
    pub fn commit(&self, id: Option<TransactionId>) -> Result<(), TransactionError> {
        self.addressed(id).iter().try_for_each(Transaction::commit)?;
        self.resolved(id);
        Ok(())
    }

    /// Rolls back the addressed members in order. Disarms the dataset timeout like
    /// [`commit`](Self::commit).
    pub fn rollback(&self, id: Option<TransactionId>) -> Result<(), TransactionError> {
        self.addressed(id).iter().try_for_each(Transaction::rollback)?;
        self.resolved(id);
        Ok(())
    }

    fn resolved(&self, id: Option<TransactionId>) {
        if id.is_none() && self.config.timeout.cancel_on_resolve && self.cancel_timeout() {
            tracing::debug!("dataset resolved, timeout cancelled");
        }
    }

    /// Registers `listener` on the addressed members. See [`Transaction::on`].
    pub fn on(
        &self,
        event: impl AsRef<str>,
        listener: impl Fn(&Event) + 'static,
        id: Option<TransactionId>,
    ) {
        let listener: Listener = Rc::new(move |e: &Event| {
            listener(e);
            Ok::<(), ListenerError>(())
        });
        for member in self.addressed(id) {
            member.on_listener(event.as_ref(), Rc::clone(&listener));
        }
    }

    /// Clones every member into a new dataset with an empty log.
    ///
    /// Each member fires [`Event::Clone`], which lands in this dataset's log. The clones keep
    /// their ids.
    pub fn try_clone(&self) -> Result<DatasetTransaction, TransactionError> {
        let members = self
            .members
            .iter()
            .map(Transaction::try_clone)
            .collect::<Result<_, _>>()?;
        Ok(Self::from_members(members, self.config))
    }

    /// Arms a one-shot timeout that resolves every member `after` from now.
    ///
    /// See [`schedule_timeout_with`](Self::schedule_timeout_with).
    pub fn schedule_timeout(
        &self,
        event_loop: &EventLoop,
        after: Duration,
        resolution: Resolution,
    ) -> TimerHandle {
        self.schedule_timeout_with(event_loop, after, resolution, |_| {})
    }

    /// Arms a one-shot timeout that resolves every member `after` from now.
    ///
    /// When it fires, every member is committed or rolled back in order, then `on_fire` is
    /// called once, then [`Event::Timeout`] fires on each member that was resolved. A member
    /// that was stopped in the meantime is skipped, with a warning. Arming again before that
    /// cancels the previous dataset timeout, and so does resolving every member explicitly under
    /// [`cancel_on_resolve`](crate::TimeoutPolicy::cancel_on_resolve). Timeouts armed on
    /// individual members are independent of this one.
    pub fn schedule_timeout_with(
        &self,
        event_loop: &EventLoop,
        after: Duration,
        resolution: Resolution,
        on_fire: impl FnOnce(&TimeoutEvent) + 'static,
    ) -> TimerHandle {
        self.cancel_timeout();
        let members: Vec<_> = self.members.iter().map(Transaction::downgrade).collect();
        let handle = event_loop.schedule(after, move || {
            let fired = TimeoutEvent { resolution, after };
            let resolved: Vec<_> = members
                .iter()
                .filter_map(|member| member.upgrade())
                .filter(|member| member.resolve_on_timeout(resolution))
                .collect();
            tracing::debug!(resolved = resolved.len(), %resolution, "dataset timeout fired");
            on_fire(&fired);
            for member in resolved {
                member.emit_timeout(fired);
            }
        });
        tracing::debug!(?after, %resolution, "armed dataset timeout");
        *self.timeout.borrow_mut() = Some(handle.clone());
        handle
    }

    /// Disarms the pending dataset timeout, if any. Returns whether there was one.
    pub fn cancel_timeout(&self) -> bool {
        // take first so the borrow ends before the task is dropped
        let timeout = self.timeout.take();
        timeout.is_some_and(|timeout| timeout.cancel())
    }

    /// Whether a dataset timeout is armed and has not fired yet.
    pub fn has_pending_timeout(&self) -> bool {
        self.timeout
            .borrow()
            .as_ref()
            .is_some_and(TimerHandle::is_pending)
    }

    /// The string form of the addressed members, in order.
    pub fn to_strings(&self, id: Option<TransactionId>) -> Vec<String> {
        self.addressed(id).iter().map(ToString::to_string).collect()
    }

    fn addressed(&self, id: Option<TransactionId>) -> &[Transaction] {
        let Some(id) = id else {
            return &self.members;
        };
        match self.find_by_id(id) {
            Some(member) => std::slice::from_ref(member),
            None => {
                tracing::debug!(transaction = %id, "no member with this id");
                &[]
            }
        }
    }
}

impl Drop for DatasetTransaction {
    fn drop(&mut self) {
        self.cancel_timeout();
    }
}

impl<'a> IntoIterator for &'a DatasetTransaction {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for DatasetTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetTransaction")
            .field("members", &self.members)
            .field("log", &self.log.entries().len())
            .field("config", &self.config)
            .field("timeout", &self.timeout.borrow())
            .finish()
    }
}

/// Formats the members as a list, like [`to_strings`](DatasetTransaction::to_strings) joined.
impl fmt::Display for DatasetTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{member}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordingListener, record};

    fn philosophers() -> DatasetTransaction {
        DatasetTransaction::new([
            record! { "name" => "Rene", "surname" => "Descartes" },
            record! { "name" => "Marcus", "surname" => "Aurelius" },
            record! { "name" => "Immanuel", "surname" => "Kant" },
        ])
    }

    fn summary(dataset: &DatasetTransaction) -> Vec<(u64, EventKind)> {
        dataset
            .log()
            .iter()
            .map(|entry| (entry.transaction_id.0, entry.operation))
            .collect()
    }

    #[test]
    fn commit_fans_out_in_member_order() {
        let dataset = philosophers();
        dataset.commit(None).unwrap();
        assert_eq!(
            summary(&dataset),
            vec![
                (0, EventKind::Commit),
                (1, EventKind::Commit),
                (2, EventKind::Commit),
            ]
        );
        let operation_ids: Vec<_> = dataset.log().iter().map(|e| e.operation_id).collect();
        assert_eq!(operation_ids, vec![0, 1, 2]);
    }

    #[test]
    fn id_zero_addresses_the_first_member() {
        let dataset = philosophers();
        dataset
            .update("name", "Aristotle", Some(TransactionId(0)))
            .unwrap();
        assert_eq!(
            dataset.to_strings(None),
            vec![
                r#"{"name":"Aristotle","surname":"Descartes"}"#,
                r#"{"name":"Marcus","surname":"Aurelius"}"#,
                r#"{"name":"Immanuel","surname":"Kant"}"#,
            ]
        );
        assert_eq!(summary(&dataset), vec![(0, EventKind::Set)]);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let dataset = philosophers();
        let recorder = RecordingListener::new();
        dataset.on(EventKind::Set, recorder.listener(), Some(TransactionId(7)));
        dataset.update("name", "Plato", Some(TransactionId(7))).unwrap();
        dataset.delete("name", Some(TransactionId(7))).unwrap();
        dataset.commit(Some(TransactionId(7))).unwrap();
        assert!(dataset.log().is_empty());
        assert!(recorder.seen().is_empty());
        assert!(dataset.to_strings(Some(TransactionId(7))).is_empty());
    }

    #[test]
    fn listeners_attach_to_the_addressed_members() {
        let dataset = philosophers();
        let recorder = RecordingListener::new();
        dataset.on(EventKind::Delete, recorder.listener(), None);
        dataset.delete("surname", None).unwrap();
        dataset.delete("surname", Some(TransactionId(2))).unwrap();
        assert_eq!(recorder.seen(), vec!["delete surname"; 3]);
        assert_eq!(dataset.log().len(), 3);
    }

    #[test]
    fn clone_starts_a_fresh_log() {
        let dataset = philosophers();
        dataset.update("born", 1596, Some(TransactionId(0))).unwrap();
        let clone = dataset.try_clone().unwrap();
        assert!(clone.log().is_empty());
        assert_eq!(
            summary(&dataset),
            vec![
                (0, EventKind::Set),
                (0, EventKind::Clone),
                (1, EventKind::Clone),
                (2, EventKind::Clone),
            ]
        );

        clone.rollback(Some(TransactionId(0))).unwrap();
        assert_eq!(summary(&clone), vec![(0, EventKind::Rollback)]);
        assert_eq!(
            dataset.find_by_id(TransactionId(0)).unwrap().get("born").unwrap(),
            Some(Value::from(1596))
        );
    }

    #[test]
    fn stopped_members_surface_errors() {
        let dataset = philosophers();
        dataset.find_by_id(TransactionId(1)).unwrap().stop();
        assert_eq!(
            dataset.commit(None),
            Err(TransactionError::Inactive {
                id: Some(TransactionId(1))
            })
        );
        assert!(dataset.commit(Some(TransactionId(2))).is_ok());
    }

    #[test]
    fn display_lists_members() {
        let dataset = DatasetTransaction::new([record! { "a" => 1 }, record! {}]);
        insta::assert_snapshot!(dataset.to_string(), @r#"[{"a":1},{}]"#);
    }
}
