// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::timestamp::Timestamp;
use std::fmt;

/// A value stored under a key of a [`Record`](crate::Record).
///
/// The set of variants mirrors what a JSON-like document can hold, plus bytes and timestamps.
/// Equality is total: doubles compare with [`f64::total_cmp`], so a `NaN` written over a `NaN`
/// squashes to a no-op like any other equal value.
// NOTE: Why no U32 or I32? Make this a serialization concern.
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    Double(f64),
    String(String),
    Bytes(#[cfg_attr(feature = "serde", serde(with = "serde_bytes"))] Vec<u8>),
    Timestamp(Timestamp),
    List(Vec<Value>),
}

impl Value {
    /// A short name for the kind of value held.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            Value::U64(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Builds a [`Value::List`] from anything convertible into values.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! impl_from {
(
    $(
        $source:ty => $target:ident $(with $conv:ident)?
    ),* $(,)?
    ) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Self::$target(impl_from!(value$(, $conv)?))
                }
            }
        )*
    };

    ($value:ident, $conv:ident) => {
        $value.$conv()
    };

    ($value:ident) => {
        $value
    };
}

impl_from!(
    &[u8]      => Bytes with into,
    Vec<u8>    => Bytes,
    String     => String,
    &str       => String with to_string,
    f64        => Double,
    u8         => U64 with into,
    u16        => U64 with into,
    u32        => U64 with into,
    u64        => U64,
    i8         => I64 with into,
    i16        => I64 with into,
    i32        => I64 with into,
    i64        => I64,
    bool       => Bool,
    Timestamp  => Timestamp,
);

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(inner) => fmt::Debug::fmt(inner, f),
            Self::I64(inner) => write!(f, "{inner}"),
            Self::U64(inner) => write!(f, "{inner}u"),
            // always print at least 1 decimal so doubles and integers are told apart
            Self::Double(inner) => write!(f, "{inner:?}d"),
            Self::String(inner) => fmt::Debug::fmt(inner, f),
            Self::Bytes(inner) => write!(f, "{inner:02X?}"),
            Self::Timestamp(inner) => fmt::Debug::fmt(inner, f),
            Self::List(inner) => f.debug_list().entries(inner).finish(),
        }
    }
}

/// Formats the value as a JSON literal.
///
/// Doubles that are not finite print as `null`, and bytes as an array of numbers.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(inner) => write!(f, "{inner}"),
            Self::I64(inner) => write!(f, "{inner}"),
            Self::U64(inner) => write!(f, "{inner}"),
            Self::Double(inner) if inner.is_finite() => write!(f, "{inner}"),
            Self::Double(_) => f.write_str("null"),
            Self::String(inner) => write_json_str(f, inner),
            Self::Bytes(inner) => {
                f.write_str("[")?;
                for (i, byte) in inner.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{byte}")?;
                }
                f.write_str("]")
            }
            Self::Timestamp(inner) => write!(f, "\"{inner}\""),
            Self::List(inner) => {
                f.write_str("[")?;
                for (i, value) in inner.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Writes `s` quoted, with the escapes JSON requires.
pub(crate) fn write_json_str(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        let escape = match c {
            '"' => Some("\\\""),
            '\\' => Some("\\\\"),
            '\n' => Some("\\n"),
            '\r' => Some("\\r"),
            '\t' => Some("\\t"),
            c if c.is_ascii_control() => None,
            _ => continue,
        };
        f.write_str(&s[start..i])?;
        match escape {
            Some(escape) => f.write_str(escape)?,
            None => write!(f, "\\u{:04x}", u32::from(c))?,
        }
        start = i + c.len_utf8();
    }
    f.write_str(&s[start..])?;
    f.write_str("\"")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(b1), Bool(b2)) => b1 == b2,
            (I64(i1), I64(i2)) => i1 == i2,
            (U64(u1), U64(u2)) => u1 == u2,
            (Double(d1), Double(d2)) => d1.total_cmp(d2).is_eq(),
            (String(s1), String(s2)) => s1 == s2,
            (Bytes(b1), Bytes(b2)) => b1 == b2,
            (Timestamp(t1), Timestamp(t2)) => t1 == t2,
            (List(l1), List(l2)) => l1 == l2,
            _ => false,
        }
    }
}
impl Eq for Value {}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Self::Bool(b) if b == other)
    }
}
impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, Self::Double(d) if d == other)
    }
}
impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64().is_some_and(|i| &i == other)
    }
}
// i32 because it's the "default" inference integer type
impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_i64().is_some_and(|i| i == i64::from(*other))
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for Value {
    // keeps lists shallow; nesting adds nothing to delta bookkeeping
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        use quickcheck::Arbitrary;
        let choices = [
            "null",
            "bool",
            "i64",
            "u64",
            "double",
            "string",
            "bytes",
            "timestamp",
            "list",
        ];
        match *g.choose(&choices).expect("choices is non-empty") {
            "null" => Self::Null,
            "bool" => Self::Bool(bool::arbitrary(g)),
            "i64" => Self::I64(i64::arbitrary(g)),
            "u64" => Self::U64(u64::arbitrary(g)),
            "double" => Self::Double(f64::arbitrary(g)),
            "string" => Self::String(String::arbitrary(g)),
            "bytes" => Self::Bytes(Vec::arbitrary(g)),
            "timestamp" => Self::Timestamp(Timestamp::arbitrary(g)),
            "list" => Self::List(Vec::<bool>::arbitrary(g).into_iter().map(Self::Bool).collect()),
            _ => unreachable!(),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        use quickcheck::Arbitrary;
        match self {
            Value::Null => quickcheck::empty_shrinker(),
            Value::String(v) => Box::new(
                v.shrink()
                    .map(Value::String)
                    .chain(std::iter::once(Value::Null)),
            ),
            Value::I64(v) => Box::new(v.shrink().map(Value::I64)),
            Value::U64(v) => Box::new(v.shrink().map(Value::U64)),
            Value::List(v) => Box::new(v.shrink().map(Value::List)),
            _ => quickcheck::single_shrinker(Value::Null),
        }
    }
}
