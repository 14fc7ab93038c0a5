//! Produced instances
//!
//! Factories work with dynamically shaped records: the ORM layer owns the
//! concrete schema, the factory only moves attribute maps and wires
//! relationships between records.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod definitions;

pub use definitions::{
    Definitions, FactoryState, FixedState, ModelDefinition, RelationKind, StateFn,
};

/// Attribute map of a single record
pub type Attributes = HashMap<String, Value>;

/// Convert a JSON object into an attribute map; other values yield an empty map
pub fn into_attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Attributes::new(),
    }
}

/// Values accepted wherever an attribute map is expected
pub trait IntoAttributes {
    fn into_attributes(self) -> Attributes;
}

impl IntoAttributes for Attributes {
    fn into_attributes(self) -> Attributes {
        self
    }
}

impl IntoAttributes for Value {
    fn into_attributes(self) -> Attributes {
        into_attributes(self)
    }
}

/// A single entity instance, saved or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    entity: String,
    id: Option<i64>,
    exists: bool,
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, Relation>,
}

impl Record {
    /// Create an unsaved record
    pub fn new(entity: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            entity: entity.into(),
            id: None,
            exists: false,
            attributes,
            relations: BTreeMap::new(),
        }
    }

    /// Entity (model) name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Primary key, once saved
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Whether the record has been persisted
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Mark the record as persisted under `id`
    pub fn mark_saved(&mut self, id: i64) {
        self.id = Some(id);
        self.exists = true;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Get an attribute value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Get a string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set an attribute value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Loaded relationship by accessor name
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Related records for a relationship, empty when not loaded
    pub fn related(&self, name: &str) -> &[Record] {
        self.relations.get(name).map(Relation::records).unwrap_or(&[])
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    /// Attach a loaded relationship, replacing an earlier one of the same name
    pub fn set_relation(&mut self, name: impl Into<String>, relation: Relation) {
        self.relations.insert(name.into(), relation);
    }

    /// Read an attribute or loaded relationship as a JSON value
    pub fn field(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return self.id.map(Value::from);
        }
        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }
        self.relations
            .get(name)
            .and_then(|relation| serde_json::to_value(relation).ok())
    }
}

/// A loaded relationship on a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relation {
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Relation {
    /// The related records as a slice, regardless of multiplicity
    pub fn records(&self) -> &[Record] {
        match self {
            Relation::One(record) => std::slice::from_ref(record.as_ref()),
            Relation::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Result of a `make`/`create` call: one record when the factory count is 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Produced {
    One(Record),
    Many(Vec<Record>),
}

impl Produced {
    /// Wrap records, collapsing to [`Produced::One`] when `single` is set
    pub(crate) fn from_records(mut records: Vec<Record>, single: bool) -> Self {
        if single && records.len() == 1 {
            if let Some(record) = records.pop() {
                return Produced::One(record);
            }
        }
        Produced::Many(records)
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Produced::One(_))
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// All produced records in creation order
    pub fn records(&self) -> &[Record] {
        match self {
            Produced::One(record) => std::slice::from_ref(record),
            Produced::Many(records) => records,
        }
    }

    /// The single record, if exactly one was produced
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Produced::One(record) => Some(record),
            Produced::Many(_) => None,
        }
    }

    pub fn into_one(self) -> Option<Record> {
        match self {
            Produced::One(record) => Some(record),
            Produced::Many(_) => None,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Produced::One(record) => vec![record],
            Produced::Many(records) => records,
        }
    }

    /// Convert into a relationship value with the same multiplicity
    pub fn into_relation(self) -> Relation {
        match self {
            Produced::One(record) => Relation::One(Box::new(record)),
            Produced::Many(records) => Relation::Many(records),
        }
    }
}

impl From<Record> for Produced {
    fn from(record: Record) -> Self {
        Produced::One(record)
    }
}
