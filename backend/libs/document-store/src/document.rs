/// Documents and field writes
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::Result;

/// Field map of a stored document
pub type Fields = Map<String, Value>;

/// A stored document as returned by reads and live queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub fields: Fields,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode into a model, injecting the document id as `id`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.decode_with_id("id")
    }

    /// Decode into a model, injecting the document id under `id_field`.
    ///
    /// A stored field with the same name wins over the injected id.
    pub fn decode_with_id<T: DeserializeOwned>(&self, id_field: &str) -> Result<T> {
        let mut fields = self.fields.clone();
        fields
            .entry(id_field.to_string())
            .or_insert_with(|| Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// A single field write
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain value
    Value(Value),
    /// Replaced by the store clock (epoch milliseconds) when applied
    ServerTimestamp,
    /// Append each element not already present
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each element
    ArrayRemove(Vec<Value>),
    /// Remove the field
    Delete,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

/// Ordered set of field writes used by `add`, `set` and `update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentData {
    entries: Vec<(String, FieldValue)>,
}

impl DocumentData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any value that serializes to a JSON object
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (k, FieldValue::Value(v)))
                    .collect(),
            }),
            other => Err(StoreError::InvalidArgument(format!(
                "document data must be an object, got {}",
                other
            ))),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn server_timestamp(self, name: impl Into<String>) -> Self {
        self.field(name, FieldValue::ServerTimestamp)
    }

    pub fn array_union(self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.field(name, FieldValue::ArrayUnion(values))
    }

    pub fn array_remove(self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.field(name, FieldValue::ArrayRemove(values))
    }

    pub fn delete_field(self, name: impl Into<String>) -> Self {
        self.field(name, FieldValue::Delete)
    }

    pub fn entries(&self) -> &[(String, FieldValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply the writes in order; `server_time` is the store clock in epoch millis
    pub fn apply(&self, target: &mut Fields, server_time: i64) {
        for (name, write) in &self.entries {
            match write {
                FieldValue::Value(value) => {
                    target.insert(name.clone(), value.clone());
                }
                FieldValue::ServerTimestamp => {
                    target.insert(name.clone(), Value::from(server_time));
                }
                FieldValue::ArrayUnion(values) => {
                    let slot = target
                        .entry(name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        for value in values {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                    }
                }
                FieldValue::ArrayRemove(values) => {
                    let slot = target
                        .entry(name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        items.retain(|item| !values.contains(item));
                    }
                }
                FieldValue::Delete => {
                    target.remove(name);
                }
            }
        }
    }
}
