//! Relationship call arguments and stored relationship requests

use serde_json::Value;

use crate::factory::Factory;
use crate::model::{into_attributes, Attributes, Produced, Record};

/// One argument of a relationship call such as `withCustomers(2, {...})`
#[derive(Debug, Clone)]
pub enum Argument {
    /// How many related records to build
    Count(i64),
    /// Attributes for the related factory
    Attributes(Attributes),
    /// An existing record to use as-is
    Record(Record),
    /// Existing records to use as-is
    Records(Vec<Record>),
    /// A configured factory to use as-is
    Factory(Box<Factory>),
}

impl Argument {
    /// Payload for arguments that bypass factory resolution
    pub(crate) fn into_literal(self) -> Option<RelationshipData> {
        match self {
            Argument::Record(record) => Some(RelationshipData::Record(record)),
            Argument::Records(records) => Some(RelationshipData::Records(records)),
            Argument::Factory(factory) => Some(RelationshipData::Factory(factory)),
            Argument::Count(_) | Argument::Attributes(_) => None,
        }
    }

    pub(crate) fn is_literal(&self) -> bool {
        !matches!(self, Argument::Count(_) | Argument::Attributes(_))
    }
}

impl From<i64> for Argument {
    fn from(count: i64) -> Self {
        Argument::Count(count)
    }
}

impl From<i32> for Argument {
    fn from(count: i32) -> Self {
        Argument::Count(i64::from(count))
    }
}

impl From<usize> for Argument {
    fn from(count: usize) -> Self {
        Argument::Count(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

impl From<Attributes> for Argument {
    fn from(attributes: Attributes) -> Self {
        Argument::Attributes(attributes)
    }
}

/// Integers become counts; anything else is read as an attribute object
impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        match value.as_i64() {
            Some(count) => Argument::Count(count),
            None => Argument::Attributes(into_attributes(value)),
        }
    }
}

impl From<Record> for Argument {
    fn from(record: Record) -> Self {
        Argument::Record(record)
    }
}

impl From<Vec<Record>> for Argument {
    fn from(records: Vec<Record>) -> Self {
        Argument::Records(records)
    }
}

impl From<Produced> for Argument {
    fn from(produced: Produced) -> Self {
        match produced {
            Produced::One(record) => Argument::Record(record),
            Produced::Many(records) => Argument::Records(records),
        }
    }
}

impl From<Factory> for Argument {
    fn from(factory: Factory) -> Self {
        Argument::Factory(Box::new(factory))
    }
}

/// What a relationship resolves to at build time
#[derive(Debug, Clone)]
pub enum RelationshipData {
    Record(Record),
    Records(Vec<Record>),
    Factory(Box<Factory>),
}

impl From<Factory> for RelationshipData {
    fn from(factory: Factory) -> Self {
        RelationshipData::Factory(Box::new(factory))
    }
}

impl From<Record> for RelationshipData {
    fn from(record: Record) -> Self {
        RelationshipData::Record(record)
    }
}

impl From<Vec<Record>> for RelationshipData {
    fn from(records: Vec<Record>) -> Self {
        RelationshipData::Records(records)
    }
}

/// A classified relationship call, consumed once per build
#[derive(Debug, Clone)]
pub struct RelationshipRequest {
    name: String,
    method: String,
    data: RelationshipData,
}

impl RelationshipRequest {
    pub fn new(name: impl Into<String>, method: impl Into<String>, data: RelationshipData) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            data,
        }
    }

    /// Relationship accessor name (`customers`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The call that produced this request (`withCustomers`)
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn data(&self) -> &RelationshipData {
        &self.data
    }

    /// The nested factory, if the payload is one
    pub fn factory(&self) -> Option<&Factory> {
        match &self.data {
            RelationshipData::Factory(factory) => Some(factory.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_conversion() {
        assert!(matches!(Argument::from(json!(3)), Argument::Count(3)));

        match Argument::from(json!({"name": "X"})) {
            Argument::Attributes(attributes) => {
                assert_eq!(attributes.get("name"), Some(&json!("X")))
            }
            other => panic!("unexpected argument {:?}", other),
        }
    }

    #[test]
    fn test_literals_bypass_resolution() {
        let record = Record::new("Address", Attributes::new());

        assert!(Argument::from(record.clone()).is_literal());
        assert!(Argument::from(vec![record]).is_literal());
        assert!(!Argument::from(2).is_literal());
        assert!(Argument::from(json!({})).into_literal().is_none());
    }
}
