// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation
//!
//! Records map to JSON objects and values to their natural JSON counterparts, with two
//! exceptions: bytes become a base64 string and timestamps an RFC 3339 string.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "Rene",
//!   "surname": "Descartes",
//!   "born": 1596,
//!   "languages": ["Latin", "French"]
//! }
//! ```
use crate::{DatasetTransaction, Record, Transaction, TransactionError, Value};

/// Converts a [`Value`] to a [`serde_json::Value`].
impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => v.into(),
            Value::I64(v) => v.into(),
            Value::U64(v) => v.into(),
            // non-finite doubles have no JSON form and become null
            Value::Double(v) => v.into(),
            Value::String(v) => v.into(),
            Value::Bytes(v) => {
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v).into()
            }
            Value::Timestamp(v) => v.into(),
            Value::List(v) => serde_json::Value::Array(v.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts a [`Record`] to a [`serde_json::Value::Object`].
impl From<Record> for serde_json::Value {
    fn from(record: Record) -> Self {
        let obj = record
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::from(v)))
            .collect();
        serde_json::Value::Object(obj)
    }
}

impl Transaction {
    /// The effective view as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, TransactionError> {
        Ok(self.snapshot()?.into())
    }
}

impl DatasetTransaction {
    /// The effective views of all members, in order, as a JSON array.
    pub fn to_json(&self) -> Result<serde_json::Value, TransactionError> {
        self.iter()
            .map(Transaction::to_json)
            .collect::<Result<_, _>>()
            .map(serde_json::Value::Array)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Timestamp, record};
    use serde_json::json;

    #[test]
    fn record_to_json() {
        let record = record! {
            "name" => "Rene",
            "born" => 1596,
            "height" => 1.62,
            "portrait" => vec![0xCAu8, 0xFE],
            "died" => Timestamp::from_millis(0).unwrap(),
            "languages" => crate::Value::list(["Latin", "French"]),
            "spouse" => None::<String>,
        };
        assert_eq!(
            serde_json::Value::from(record),
            json!({
                "name": "Rene",
                "born": 1596,
                "height": 1.62,
                "portrait": "yv4=",
                "died": "1970-01-01T00:00:00.000Z",
                "languages": ["Latin", "French"],
                "spouse": null,
            })
        );
    }

    #[test]
    fn dataset_to_json_shows_effective_views() {
        let dataset = crate::DatasetTransaction::new([record! { "a" => 1 }, record! { "b" => 2 }]);
        dataset.delete("a", None).unwrap();
        assert_eq!(dataset.to_json().unwrap(), json!([{}, { "b": 2 }]));
    }
}
