use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use super::Value;

/// Stable identifier of a record within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(value: u64) -> Self {
        RecordId(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An addressable unit of stored data: an id plus named, typed fields.
///
/// Fields live in a persistent map, so cloning a record is cheap and the
/// clones never observe each other's writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    fields: OrdMap<String, Value>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Record {
            id,
            fields: OrdMap::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Sets a field, returning the previous value if any.
    pub fn put<V: Into<Value>>(&mut self, field: &str, value: V) -> Option<Value> {
        self.fields.insert(field.to_string(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
