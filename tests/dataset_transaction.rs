//! Tests for dataset transactions: addressing, fan-out, the operation log and cloning.

use deltatx::{
    DatasetTransaction, EventKind, Record, RecordingListener, TransactionConfig, Value, record,
    transaction::TransactionId,
};
use std::rc::Rc;

fn philosophers() -> Vec<Record> {
    vec![
        record! { "name" => "Rene", "surname" => "Descartes" },
        record! { "name" => "Marcus", "surname" => "Aurelius" },
        record! { "name" => "Immanuel", "surname" => "Kant" },
    ]
}

fn operations(dataset: &DatasetTransaction) -> Vec<(u64, EventKind)> {
    dataset
        .log()
        .iter()
        .map(|entry| (entry.transaction_id.0, entry.operation))
        .collect()
}

#[test]
fn commit_without_id_logs_every_member_in_order() {
    let dataset = DatasetTransaction::new(philosophers());

    dataset.commit(None).unwrap();

    assert_eq!(
        operations(&dataset),
        vec![
            (0, EventKind::Commit),
            (1, EventKind::Commit),
            (2, EventKind::Commit),
        ]
    );
}

#[test]
fn fan_out_update_then_commit_writes_every_record() {
    let shared: Vec<_> = philosophers().into_iter().map(Record::into_shared).collect();
    let dataset = DatasetTransaction::from_shared(shared.clone(), TransactionConfig::default());

    dataset.update("country", "Greece", None).unwrap();
    dataset.commit(None).unwrap();

    for record in &shared {
        assert_eq!(record.borrow().get("country").unwrap(), "Greece");
    }
    let commits: Vec<_> = operations(&dataset)
        .into_iter()
        .filter(|(_, operation)| *operation == EventKind::Commit)
        .collect();
    assert_eq!(
        commits,
        vec![
            (0, EventKind::Commit),
            (1, EventKind::Commit),
            (2, EventKind::Commit),
        ]
    );
    assert_eq!(dataset.log().len(), 6);
}

#[test]
fn fan_out_update_reaches_every_member() {
    let dataset = DatasetTransaction::new(philosophers());

    dataset.update("country", "Greece", None).unwrap();
    dataset.delete("surname", Some(TransactionId(2))).unwrap();
    dataset.rollback(Some(TransactionId(1))).unwrap();
    dataset.commit(None).unwrap();

    assert_eq!(
        dataset.to_strings(None),
        vec![
            r#"{"country":"Greece","name":"Rene","surname":"Descartes"}"#,
            r#"{"name":"Marcus","surname":"Aurelius"}"#,
            r#"{"country":"Greece","name":"Immanuel"}"#,
        ]
    );
    assert_eq!(
        operations(&dataset),
        vec![
            (0, EventKind::Set),
            (1, EventKind::Set),
            (2, EventKind::Set),
            (2, EventKind::Delete),
            (1, EventKind::Rollback),
            (0, EventKind::Commit),
            (1, EventKind::Commit),
            (2, EventKind::Commit),
        ]
    );
}

#[test]
fn the_log_numbers_operations_sequentially() {
    let dataset = DatasetTransaction::new(philosophers());
    let member = dataset.find_by_id(TransactionId(1)).unwrap();

    member.get("name").unwrap();
    member.set("name", "Aurelius").unwrap();
    dataset.commit(Some(TransactionId(1))).unwrap();

    let log = dataset.log();
    let ids: Vec<_> = log.iter().map(|entry| entry.operation_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(log.windows(2).all(|pair| pair[0].time <= pair[1].time));
    assert!(log.iter().all(|entry| entry.transaction_id == TransactionId(1)));
}

#[test]
fn datasets_share_records_with_other_transactions() {
    let shared: Vec<_> = philosophers().into_iter().map(Record::into_shared).collect();
    let dataset = DatasetTransaction::from_shared(shared.clone(), TransactionConfig::default());

    dataset.update("name", "Aristotle", Some(TransactionId(0))).unwrap();
    dataset.commit(Some(TransactionId(0))).unwrap();

    assert_eq!(shared[0].borrow().get("name").unwrap(), "Aristotle");
    assert!(Rc::ptr_eq(
        &dataset.find_by_id(TransactionId(0)).unwrap().record(),
        &shared[0]
    ));
}

#[test]
fn listeners_registered_through_the_dataset() {
    let dataset = DatasetTransaction::new(philosophers());
    let everyone = RecordingListener::new();
    let kant = RecordingListener::new();
    dataset.on(EventKind::Commit, everyone.listener(), None);
    dataset.on(EventKind::Commit, kant.listener(), Some(TransactionId(2)));

    dataset.commit(None).unwrap();

    assert_eq!(everyone.seen().len(), 3);
    assert_eq!(
        kant.seen(),
        vec![r#"commit {"name":"Immanuel","surname":"Kant"}"#]
    );
}

#[test]
fn clones_get_their_own_log_and_deltas() {
    let dataset = DatasetTransaction::new(philosophers());
    dataset.update("born", 1596, Some(TransactionId(0))).unwrap();

    let clone = dataset.try_clone().unwrap();
    assert!(clone.log().is_empty());
    assert_eq!(clone.len(), 3);
    assert_eq!(
        operations(&dataset)[1..],
        [
            (0, EventKind::Clone),
            (1, EventKind::Clone),
            (2, EventKind::Clone),
        ]
    );

    clone.update("born", 1597, Some(TransactionId(0))).unwrap();
    clone.commit(None).unwrap();
    assert_eq!(operations(&clone).len(), 4);

    let original = dataset.find_by_id(TransactionId(0)).unwrap();
    assert_eq!(original.get("born").unwrap(), Some(Value::from(1596)));
    // the clone committed into the same record
    assert_eq!(original.record().borrow().get("born").unwrap(), &1597);
}

#[test]
fn an_empty_dataset_is_fine() {
    let dataset = DatasetTransaction::new(Vec::new());
    assert!(dataset.is_empty());
    dataset.commit(None).unwrap();
    assert!(dataset.log().is_empty());
    assert_eq!(dataset.to_string(), "[]");
}
