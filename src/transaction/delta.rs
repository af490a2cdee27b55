// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{Record, RecordRandomState, Value};
use std::collections::{HashMap, HashSet};

/// Changes to a record, not full state.
///
/// A `Delta` holds the pending replacement values and the pending deletions of one
/// transaction. Together with the record it was built against it forms the transaction's
/// *effective view*, which is what reads observe. The record itself is never touched until the
/// delta is applied by a commit.
///
/// Two invariants hold for every key:
///
/// - a pending write never equals the value currently stored in the record (writing the base
///   value back squashes the pending write to a no-op), and
/// - a key is never pending both a write and a deletion.
///
/// # Example
/// ```
/// use deltatx::{Record, transaction::Delta};
///
/// let record: Record = [("name", "Rene")].into_iter().collect();
/// let mut delta = Delta::new();
///
/// delta.write(&record, "name", "Aristotle".into());
/// assert_eq!(delta.read(&record, "name").unwrap(), "Aristotle");
///
/// delta.write(&record, "name", "Rene".into());
/// assert!(delta.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    writes: HashMap<String, Value, RecordRandomState>,
    deleted: HashSet<String, RecordRandomState>,
}

/// Where the effective value of a key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A write that has not been committed yet.
    Pending,
    /// The record as of the last commit.
    Record,
}

/// The presence and effective value of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub value: Value,
    pub source: Source,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deleted.is_empty()
    }

    /// Number of pending writes plus pending deletions.
    pub fn len(&self) -> usize {
        self.writes.len() + self.deleted.len()
    }

    /// The pending write for `key`, if any.
    pub fn pending(&self, key: &str) -> Option<&Value> {
        self.writes.get(key)
    }

    /// Whether `key` is pending deletion.
    pub fn is_deleted(&self, key: &str) -> bool {
        self.deleted.contains(key)
    }

    pub fn writes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn deletions(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    /// The effective value of `key` on top of `record`.
    pub fn read<'a>(&'a self, record: &'a Record, key: &str) -> Option<&'a Value> {
        if self.deleted.contains(key) {
            return None;
        }
        self.writes.get(key).or_else(|| record.get(key))
    }

    /// Buffers `value` for `key`, squashing the write if `record` already holds `value`.
    pub fn write(&mut self, record: &Record, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.deleted.remove(&key);
        if record.get(&key) == Some(&value) {
            self.writes.remove(&key);
        } else {
            self.writes.insert(key, value);
        }
    }

    /// Marks `key` for deletion.
    ///
    /// Returns `false`, and changes nothing, if `key` was already marked.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.deleted.contains(key) {
            return false;
        }
        self.writes.remove(key);
        self.deleted.insert(key.to_string());
        true
    }

    /// The keys of the effective view: the record's keys followed by keys only written in the
    /// delta, without duplicates and without pending deletions.
    pub fn keys(&self, record: &Record) -> Vec<String> {
        let mut seen = HashSet::with_capacity_and_hasher(
            record.len() + self.writes.len(),
            RecordRandomState::default(),
        );
        record
            .keys()
            .chain(self.writes.keys().map(String::as_str))
            .filter(|key| !self.deleted.contains(*key))
            .filter(|key| seen.insert(*key))
            .map(str::to_string)
            .collect()
    }

    /// Describes `key` as seen through the effective view.
    pub fn describe(&self, record: &Record, key: &str) -> Option<KeyDescriptor> {
        if self.deleted.contains(key) {
            return None;
        }
        if let Some(value) = self.writes.get(key) {
            return Some(KeyDescriptor {
                value: value.clone(),
                source: Source::Pending,
            });
        }
        record.get(key).map(|value| KeyDescriptor {
            value: value.clone(),
            source: Source::Record,
        })
    }

    /// Materializes the effective view as a standalone record.
    pub fn effective(&self, record: &Record) -> Record {
        let mut merged = record.clone();
        self.clone().apply_to(&mut merged);
        merged
    }

    /// Applies the delta to `record`: deletions first, then writes.
    pub fn apply_to(self, record: &mut Record) {
        for key in self.deleted {
            record.remove(&key);
        }
        record.extend(self.writes);
    }

    /// Drops everything pending.
    pub fn clear(&mut self) {
        self.writes.clear();
        self.deleted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Op;
    use quickcheck::TestResult;

    fn descartes() -> Record {
        [("name", "Rene"), ("surname", "Descartes")]
            .into_iter()
            .collect()
    }

    fn apply_ops(delta: &mut Delta, record: &Record, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Write(key, value) => delta.write(record, key.as_str(), value.clone()),
                Op::Delete(key) => {
                    delta.delete(key);
                }
            }
        }
    }

    #[test]
    fn read_your_writes() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.write(&record, "name", "Aristotle".into());
        assert_eq!(delta.read(&record, "name").unwrap(), "Aristotle");
        assert_eq!(record.get("name").unwrap(), "Rene");
        assert_eq!(delta.read(&record, "surname").unwrap(), "Descartes");
        assert_eq!(delta.read(&record, "born"), None);
    }

    #[test]
    fn writing_the_base_value_back_squashes() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.write(&record, "name", "Aristotle".into());
        assert_eq!(delta.len(), 1);
        delta.write(&record, "name", "Rene".into());
        assert!(delta.pending("name").is_none());
        assert!(delta.is_empty());
    }

    #[test]
    fn delete_is_not_repeated() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.write(&record, "name", "Aristotle".into());
        assert!(delta.delete("name"));
        assert!(!delta.delete("name"));
        assert!(delta.pending("name").is_none());
        assert_eq!(delta.read(&record, "name"), None);
        assert!(delta.describe(&record, "name").is_none());
    }

    #[test]
    fn writing_revives_a_deleted_key() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.delete("name");
        delta.write(&record, "name", "Rene".into());
        assert!(!delta.is_deleted("name"));
        assert!(delta.is_empty());
        assert_eq!(delta.read(&record, "name").unwrap(), "Rene");
    }

    #[test]
    fn keys_merge_without_duplicates_or_deletions() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.write(&record, "name", "Aristotle".into());
        delta.write(&record, "born", (-384).into());
        delta.delete("surname");
        let mut keys = delta.keys(&record);
        keys.sort();
        assert_eq!(keys, vec!["born", "name"]);
    }

    #[test]
    fn describe_reports_the_source() {
        let record = descartes();
        let mut delta = Delta::new();
        delta.write(&record, "name", "Aristotle".into());
        assert_eq!(
            delta.describe(&record, "name"),
            Some(KeyDescriptor {
                value: "Aristotle".into(),
                source: Source::Pending,
            })
        );
        assert_eq!(
            delta.describe(&record, "surname").map(|d| d.source),
            Some(Source::Record)
        );
        assert_eq!(delta.describe(&record, "born"), None);
    }

    #[test]
    fn apply_deletes_then_writes() {
        let mut record = descartes();
        let mut delta = Delta::new();
        delta.delete("surname");
        delta.write(&record, "city", "Touraine".into());
        delta.apply_to(&mut record);
        assert_eq!(record.to_string(), r#"{"city":"Touraine","name":"Rene"}"#);
    }

    #[quickcheck]
    fn invariants_hold_after_any_ops(record: Record, ops: Vec<Op>) -> TestResult {
        let mut delta = Delta::new();
        apply_ops(&mut delta, &record, &ops);
        for (key, value) in delta.writes() {
            if record.get(key) == Some(value) || delta.is_deleted(key) {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }

    #[quickcheck]
    fn effective_view_matches_direct_mutation(record: Record, ops: Vec<Op>) -> bool {
        let mut direct = record.clone();
        for op in &ops {
            match op {
                Op::Write(key, value) => {
                    direct.insert(key.as_str(), value.clone());
                }
                Op::Delete(key) => {
                    direct.remove(key);
                }
            }
        }

        let mut delta = Delta::new();
        apply_ops(&mut delta, &record, &ops);
        let keys_agree = {
            let mut keys = delta.keys(&record);
            keys.sort();
            let mut expected: Vec<_> = direct.keys().map(str::to_string).collect();
            expected.sort();
            keys == expected
        };
        let reads_agree = direct
            .iter()
            .all(|(key, value)| delta.read(&record, key) == Some(value));

        let mut committed = record.clone();
        delta.apply_to(&mut committed);
        keys_agree && reads_agree && committed == direct
    }

    #[quickcheck]
    fn clearing_restores_the_record(record: Record, ops: Vec<Op>) -> bool {
        let mut delta = Delta::new();
        apply_ops(&mut delta, &record, &ops);
        delta.clear();
        delta.is_empty() && delta.effective(&record) == record
    }
}
