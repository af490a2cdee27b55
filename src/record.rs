// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The plain mutable record a [`Transaction`](crate::Transaction) wraps.
use crate::{RecordRandomState, Value, value::write_json_str};
use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

/// A record shared between a transaction and every clone of it.
///
/// Only a commit ever borrows it mutably.
pub type SharedRecord = Rc<RefCell<Record>>;

/// An open-ended mapping from string keys to [`Value`]s.
///
/// Key order is unspecified. [`Display`](fmt::Display) and [`Debug`](fmt::Debug) sort by key so
/// that the textual form of a record is canonical.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Record {
    fields: HashMap<String, Value, RecordRandomState>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the record so it can be handed to one or more transactions.
    pub fn into_shared(self) -> SharedRecord {
        Rc::new(RefCell::new(self))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Inserts `value` under `key`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn sorted(&self) -> Vec<(&str, &Value)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        record.extend(iter);
        record
    }
}

impl<K, V> Extend<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.sorted()).finish()
    }
}

/// Formats the record as a single-line JSON object with sorted keys.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.sorted().into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_json_str(f, key)?;
            write!(f, ":{value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for Record {
    // a small key space so that generated operations collide with existing fields
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        use quickcheck::Arbitrary;
        let len = usize::arbitrary(g) % 6;
        (0..len)
            .map(|_| (crate::test_util::arbitrary_key(g), Value::arbitrary(g)))
            .collect()
    }
}
