// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Generators shared by the property tests.
use crate::Value;
use quickcheck::{Arbitrary, Gen};
use std::fmt;

const KEYS: [&str; 6] = ["name", "surname", "city", "born", "age", "languages"];

/// A key from a deliberately small key space, so that generated operations overlap.
pub(crate) fn arbitrary_key(g: &mut Gen) -> String {
    (*g.choose(&KEYS).expect("KEYS is non-empty")).to_string()
}

/// One buffered mutation.
#[derive(Clone)]
#[cfg_attr(feature = "arbitrary", allow(dead_code))]
pub(crate) enum Op {
    Write(String, Value),
    Delete(String),
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Write(key, value) => write!(f, "{key} = {value:?}"),
            Op::Delete(key) => write!(f, "delete {key}"),
        }
    }
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        // writes are more interesting than deletes, weigh them 3:1
        if u8::arbitrary(g) % 4 == 0 {
            Op::Delete(arbitrary_key(g))
        } else {
            Op::Write(arbitrary_key(g), Value::arbitrary(g))
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Op::Write(key, value) => {
                let key = key.clone();
                Box::new(value.shrink().map(move |v| Op::Write(key.clone(), v)))
            }
            Op::Delete(_) => quickcheck::empty_shrinker(),
        }
    }
}
