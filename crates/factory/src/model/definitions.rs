//! Model definitions: default attributes, named states and ORM hooks
//!
//! A definition is what the persistence layer instantiates records from. The
//! factory engine never looks inside one; it only passes state names and
//! attribute overrides through.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{Attributes, Record};
use crate::error::{FactoryError, FactoryResult};
use crate::naming::entity_basename;

/// Named attribute modifier applied on top of a definition
pub trait FactoryState: Send + Sync {
    fn apply(&self, attributes: &mut Attributes) -> FactoryResult<()>;
}

/// State that overwrites a fixed set of attributes
#[derive(Debug, Clone)]
pub struct FixedState(pub Attributes);

impl FactoryState for FixedState {
    fn apply(&self, attributes: &mut Attributes) -> FactoryResult<()> {
        attributes.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// State computed by a closure
pub struct StateFn<F>(pub F);

impl<F> FactoryState for StateFn<F>
where
    F: Fn(&mut Attributes) + Send + Sync,
{
    fn apply(&self, attributes: &mut Attributes) -> FactoryResult<()> {
        (self.0)(attributes);
        Ok(())
    }
}

/// Relationship kinds the persistence layer knows how to wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

type AttributeGenerator = Arc<dyn Fn() -> Attributes + Send + Sync>;
type CreatedHook = Arc<dyn Fn(&mut Record) -> FactoryResult<()> + Send + Sync>;

/// Definition of one model for the base factory
#[derive(Clone)]
pub struct ModelDefinition {
    entity: String,
    attributes: AttributeGenerator,
    states: HashMap<String, Arc<dyn FactoryState>>,
    after_creating: Vec<CreatedHook>,
    relations: HashMap<String, RelationKind>,
    timestamps: bool,
}

impl std::fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("entity", &self.entity)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("relations", &self.relations)
            .field("timestamps", &self.timestamps)
            .finish()
    }
}

impl ModelDefinition {
    /// Define a model with a default attribute generator
    pub fn new<F>(entity: impl Into<String>, attributes: F) -> Self
    where
        F: Fn() -> Attributes + Send + Sync + 'static,
    {
        Self {
            entity: entity.into(),
            attributes: Arc::new(attributes),
            states: HashMap::new(),
            after_creating: Vec::new(),
            relations: HashMap::new(),
            timestamps: false,
        }
    }

    /// Add a state that overwrites fixed attributes (`json!({"active": false})`)
    pub fn state(self, name: impl Into<String>, attributes: Value) -> Self {
        self.state_with(name, FixedState(super::into_attributes(attributes)))
    }

    /// Add a state with custom behavior
    pub fn state_with<S: FactoryState + 'static>(
        mut self,
        name: impl Into<String>,
        state: S,
    ) -> Self {
        self.states.insert(name.into(), Arc::new(state));
        self
    }

    /// Declare the kind of a relationship accessor
    pub fn relation(mut self, name: impl Into<String>, kind: RelationKind) -> Self {
        self.relations.insert(name.into(), kind);
        self
    }

    /// Stamp `created_at`/`updated_at` on save
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Hook run by the ORM after the factory has created records
    pub fn after_creating<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Record) -> FactoryResult<()> + Send + Sync + 'static,
    {
        self.after_creating.push(Arc::new(hook));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.relations.get(name).copied()
    }

    /// Build an unsaved record: definition, then states in order, then overrides
    pub fn instantiate(&self, states: &[String], overrides: Attributes) -> FactoryResult<Record> {
        let mut attributes = (self.attributes)();

        for name in states {
            let state = self.states.get(name).ok_or_else(|| FactoryError::UndefinedState {
                entity: self.entity.clone(),
                state: name.clone(),
            })?;
            state.apply(&mut attributes)?;
        }

        attributes.extend(overrides);
        Ok(Record::new(self.entity.clone(), attributes))
    }

    fn run_after_creating(&self, record: &mut Record) -> FactoryResult<()> {
        for hook in &self.after_creating {
            hook(record)?;
        }
        Ok(())
    }
}

/// All model definitions known to a persistence adapter
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    models: HashMap<String, ModelDefinition>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any earlier one for the same entity
    pub fn define(mut self, definition: ModelDefinition) -> Self {
        self.models.insert(definition.entity.clone(), definition);
        self
    }

    /// Look up a definition by full entity name, then by basename
    pub fn get(&self, entity: &str) -> FactoryResult<&ModelDefinition> {
        self.models
            .get(entity)
            .or_else(|| self.models.get(entity_basename(entity)))
            .ok_or_else(|| FactoryError::UndefinedModel(entity.to_string()))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.get(entity).is_ok()
    }

    pub fn instantiate(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
    ) -> FactoryResult<Record> {
        self.get(entity)?.instantiate(states, attributes)
    }

    /// Declared kind of `relationship` on `entity`, if any
    pub fn relation_kind(&self, entity: &str, relationship: &str) -> Option<RelationKind> {
        self.get(entity).ok()?.relation_kind(relationship)
    }

    /// Run the ORM-level after-creating hooks of each record's definition
    pub fn after_creating(&self, records: &mut [Record]) -> FactoryResult<()> {
        for record in records.iter_mut() {
            if let Ok(definition) = self.get(record.entity()) {
                definition.run_after_creating(record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_definition() -> ModelDefinition {
        ModelDefinition::new("User", || {
            crate::model::into_attributes(json!({
                "name": "John",
                "active": true,
                "email_verified_at": "2020-01-01",
            }))
        })
        .state("inactive", json!({"active": false}))
        .state("unverified", json!({"email_verified_at": null}))
        .state_with(
            "shouting",
            StateFn(|attributes: &mut Attributes| {
                let upper = attributes
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_uppercase);
                if let Some(name) = upper {
                    attributes.insert("name".to_string(), json!(name));
                }
            }),
        )
    }

    #[test]
    fn test_states_apply_in_order_before_overrides() {
        let definitions = Definitions::new().define(user_definition());
        let states = vec!["inactive".to_string(), "unverified".to_string()];
        let overrides = crate::model::into_attributes(json!({"active": true}));

        let record = definitions.instantiate("User", &states, overrides).unwrap();

        assert_eq!(record.get("active"), Some(&json!(true)));
        assert_eq!(record.get("email_verified_at"), Some(&Value::Null));
        assert!(!record.exists());
    }

    #[test]
    fn test_closure_state() {
        let definitions = Definitions::new().define(user_definition());
        let record = definitions
            .instantiate("User", &["shouting".to_string()], Attributes::new())
            .unwrap();

        assert_eq!(record.get_str("name"), Some("JOHN"));
    }

    #[test]
    fn test_unknown_state_and_model() {
        let definitions = Definitions::new().define(user_definition());

        let state = definitions.instantiate("User", &["banned".to_string()], Attributes::new());
        assert!(matches!(state, Err(FactoryError::UndefinedState { .. })));

        let model = definitions.instantiate("Pet", &[], Attributes::new());
        assert!(matches!(model, Err(FactoryError::UndefinedModel(_))));
    }

    #[test]
    fn test_lookup_by_basename() {
        let definitions = Definitions::new().define(user_definition());
        assert!(definitions.contains("app::models::User"));
    }

    #[test]
    fn test_after_creating_hooks() {
        let definitions = Definitions::new().define(user_definition().after_creating(|record| {
            record.set("welcomed", true);
            Ok(())
        }));
        let mut records = vec![definitions.instantiate("User", &[], Attributes::new()).unwrap()];

        definitions.after_creating(&mut records).unwrap();

        assert_eq!(records[0].get("welcomed"), Some(&json!(true)));
    }
}
