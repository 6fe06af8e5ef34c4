//! Row values, snapshots and deltas as they are persisted on disk.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A single column value.
///
/// Only scalars are stored; nested JSON coming out of a source is kept as its
/// JSON text (see [`Scalar::from_json`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Scalar {
    /// Convert an arbitrary JSON value into a scalar.
    ///
    /// Arrays and objects collapse to their compact JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(b),
            serde_json::Value::Number(n) => Scalar::Number(n),
            serde_json::Value::String(s) => Scalar::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Scalar::String(nested.to_string())
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer view of a number, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Number(v.into())
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Number(v.into())
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Scalar::Null,
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

// Goes through `serde_json::Value` so numbers keep their exact source text
// (`arbitrary_precision`); NUMERIC values wider than an f64 survive replay.
impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Array(_) => Err(de::Error::custom(
                "expected a scalar column value, found an array",
            )),
            serde_json::Value::Object(_) => Err(de::Error::custom(
                "expected a scalar column value, found an object",
            )),
            value => Ok(Scalar::from_json(value)),
        }
    }
}

/// Column name -> value. Ordered by column name so equal rows hash equally.
pub type Payload = BTreeMap<String, Scalar>;

/// Opaque row identifier used only for delta bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// A new random id.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row with its bookkeeping id. Persisted as `{"index": .., "object": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    #[serde(rename = "index")]
    pub id: RecordId,
    #[serde(rename = "object")]
    pub payload: Payload,
}

impl RowRecord {
    /// Wrap a payload under a fresh id.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: RecordId::fresh(),
            payload,
        }
    }

    pub fn with_id(id: RecordId, payload: Payload) -> Self {
        Self { id, payload }
    }
}

/// Full row set of one table at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: Vec<RowRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<RowRecord>) -> Self {
        Self { records }
    }

    /// Build a snapshot from freshly fetched rows, assigning new ids.
    pub fn from_payloads(payloads: impl IntoIterator<Item = Payload>) -> Self {
        Self {
            records: payloads.into_iter().map(RowRecord::new).collect(),
        }
    }

    pub fn records(&self) -> &[RowRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<RowRecord> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<RowRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.records.iter().map(|r| &r.payload)
    }

    /// Distinct payloads of this snapshot.
    pub fn payload_set(&self) -> HashSet<&Payload> {
        self.payloads().collect()
    }

    /// True when both snapshots hold the same set of payloads, ignoring ids.
    pub fn same_payloads(&self, other: &Snapshot) -> bool {
        self.payload_set() == other.payload_set()
    }
}

/// Changeset between two snapshots of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub added: Vec<RowRecord>,
    pub deleted: Vec<RecordId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}
