//! Logical contact records
//!
//! The application-facing representation produced by the codec: a flat map
//! from logical field keys (`field` or `field:subtype`) to values, plus the
//! raw-attribute shadow the mutation planner diffs against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dirbook_core::entry::AttrMap;

/// Kind tag of a decoded record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// A contact entry.
    #[default]
    Person,
    /// A group entry; decoded read-only.
    Group,
}

/// A logical field value: scalar, sequence, or composite sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Single value.
    One(String),
    /// Ordered sequence of values.
    Many(Vec<String>),
    /// Sequence of composite values (child field to value).
    Composites(Vec<BTreeMap<String, String>>),
}

impl FieldValue {
    /// First scalar value, if any.
    pub fn scalar(&self) -> Option<&str> {
        match self {
            FieldValue::One(v) => Some(v),
            FieldValue::Many(list) => list.first().map(String::as_str),
            FieldValue::Composites(_) => None,
        }
    }

    /// All plain values; empty for composites.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::One(v) => vec![v.as_str()],
            FieldValue::Many(list) => list.iter().map(String::as_str).collect(),
            FieldValue::Composites(_) => Vec::new(),
        }
    }

    /// Whether the value carries no content at all.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::One(v) => v.is_empty(),
            FieldValue::Many(list) => list.iter().all(String::is_empty),
            FieldValue::Composites(list) => {
                list.iter().all(|c| c.values().all(String::is_empty))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::One(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::One(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(list: Vec<String>) -> Self {
        FieldValue::Many(list)
    }
}

/// Application-facing contact or group record.
///
/// Created by the codec; mutated only by the application layer. The `raw`
/// shadow keeps the attribute state the record was decoded from, so the
/// mutation planner can compute a minimal diff on save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalRecord {
    /// Externally-stable identifier, reversibly derived from the DN.
    pub id: String,

    /// Distinguished name of the backing entry.
    pub dn: String,

    /// Person or group.
    pub kind: RecordKind,

    /// Groups (and deployment-restricted sources) decode read-only.
    pub read_only: bool,

    /// Logical field key (`field` or `field:subtype`) to value.
    pub fields: BTreeMap<String, FieldValue>,

    /// Raw attribute state at decode time, for diffing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: AttrMap,
}

impl LogicalRecord {
    /// Get a field value by exact key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// First scalar value of a field key.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::scalar)
    }

    /// Set a field value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set a field value (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// All values stored under a base field, across its subtyped keys.
    /// Keys are `field` or `field:subtype`; this collects both forms.
    pub fn field_values(&self, field: &str) -> Vec<&str> {
        let prefix = format!("{field}:");
        self.fields
            .iter()
            .filter(|(key, _)| *key == field || key.starts_with(&prefix))
            .flat_map(|(_, value)| value.values())
            .collect()
    }
}
