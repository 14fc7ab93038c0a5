//! Factory registry
//!
//! Concrete factories register a [`Blueprint`] once at startup. Relationship
//! calls are resolved against the registry by conventional name instead of
//! looking types up at runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::assertions::{AssertionBridge, TestAssertions};
use crate::config::FactoryConfig;
use crate::error::{FactoryError, FactoryResult};
use crate::factory::Factory;
use crate::naming::NameResolver;
use crate::request::RelationshipData;
use crate::store::Persistence;

type DefaultBuilder =
    Arc<dyn Fn(&Arc<FactoryRegistry>) -> FactoryResult<RelationshipData> + Send + Sync>;

/// A baseline relationship a factory applies unless the caller overrides or suppresses it
#[derive(Clone)]
pub struct DefaultRelationship {
    method: String,
    build: DefaultBuilder,
}

impl DefaultRelationship {
    /// `method` is the declaration name, e.g. `defaultForUser`
    pub fn new<F>(method: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Arc<FactoryRegistry>) -> FactoryResult<RelationshipData> + Send + Sync + 'static,
    {
        Self {
            method: method.into(),
            build: Arc::new(build),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Produce the literal payload for this default
    pub fn build(&self, registry: &Arc<FactoryRegistry>) -> FactoryResult<RelationshipData> {
        (self.build)(registry)
    }
}

impl fmt::Debug for DefaultRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRelationship")
            .field("method", &self.method)
            .finish()
    }
}

/// What a concrete factory type declares about itself
pub trait Blueprint: Send + Sync + 'static {
    /// Registered name, e.g. `UserFactory`
    fn name(&self) -> &str;

    /// Explicit entity, overriding the name convention
    fn entity(&self) -> Option<&str> {
        None
    }

    fn defaults(&self) -> Vec<DefaultRelationship> {
        Vec::new()
    }
}

/// Blueprint assembled from values, for factories that need no custom type
#[derive(Debug, Clone)]
pub struct NamedBlueprint {
    name: String,
    entity: Option<String>,
    defaults: Vec<DefaultRelationship>,
}

impl NamedBlueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: None,
            defaults: Vec::new(),
        }
    }

    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn default_relationship<F>(mut self, method: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Arc<FactoryRegistry>) -> FactoryResult<RelationshipData> + Send + Sync + 'static,
    {
        self.defaults.push(DefaultRelationship::new(method, build));
        self
    }
}

impl Blueprint for NamedBlueprint {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    fn defaults(&self) -> Vec<DefaultRelationship> {
        self.defaults.clone()
    }
}

/// Registered factories plus the collaborators every factory shares
pub struct FactoryRegistry {
    blueprints: HashMap<String, Arc<dyn Blueprint>>,
    store: Arc<dyn Persistence>,
    assertions: Arc<dyn AssertionBridge>,
    config: FactoryConfig,
    resolver: NameResolver,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("blueprints", &self.names())
            .field("config", &self.config)
            .finish()
    }
}

impl FactoryRegistry {
    pub fn builder(store: Arc<dyn Persistence>) -> FactoryRegistryBuilder {
        FactoryRegistryBuilder::new(store)
    }

    /// Whether a factory is registered under `name`
    pub fn exists(&self, name: &str) -> bool {
        self.blueprints.contains_key(name)
    }

    /// Registered factory names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blueprints.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn blueprint(&self, name: &str) -> FactoryResult<Arc<dyn Blueprint>> {
        self.blueprints
            .get(name)
            .cloned()
            .ok_or_else(|| FactoryError::UnknownFactory(name.to_string()))
    }

    /// First registered candidate for a relationship, with every name that was checked
    pub fn find_candidate(&self, relationship: &str) -> (Option<String>, Vec<String>) {
        let candidates = self.resolver.candidates(relationship);
        let found = candidates.iter().find(|name| self.exists(name)).cloned();
        (found, candidates)
    }

    /// A fresh factory with count 1
    pub fn factory(self: &Arc<Self>, name: &str) -> FactoryResult<Factory> {
        Ok(Factory::new(self, self.blueprint(name)?))
    }

    /// A fresh factory producing `count` records
    pub fn factory_times(self: &Arc<Self>, name: &str, count: i64) -> FactoryResult<Factory> {
        Factory::times(self, self.blueprint(name)?, count)
    }

    /// Entity a blueprint builds: explicit override, else derived from its name
    pub fn entity_of(&self, blueprint: &dyn Blueprint) -> String {
        match blueprint.entity() {
            Some(entity) => entity.to_string(),
            None => self.resolver.entity_for(blueprint.name()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    pub fn assertions(&self) -> &dyn AssertionBridge {
        self.assertions.as_ref()
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }
}

/// Builder for [`FactoryRegistry`]
pub struct FactoryRegistryBuilder {
    blueprints: HashMap<String, Arc<dyn Blueprint>>,
    store: Arc<dyn Persistence>,
    assertions: Arc<dyn AssertionBridge>,
    config: FactoryConfig,
}

impl FactoryRegistryBuilder {
    fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            blueprints: HashMap::new(),
            store,
            assertions: Arc::new(TestAssertions),
            config: FactoryConfig::default(),
        }
    }

    /// Register a blueprint under its own name, replacing an earlier one
    pub fn register<B: Blueprint>(mut self, blueprint: B) -> Self {
        self.blueprints
            .insert(blueprint.name().to_string(), Arc::new(blueprint));
        self
    }

    /// Register a plain named factory
    pub fn register_named(self, name: impl Into<String>) -> Self {
        self.register(NamedBlueprint::new(name))
    }

    pub fn assertions<A: AssertionBridge + 'static>(mut self, bridge: A) -> Self {
        self.assertions = Arc::new(bridge);
        self
    }

    pub fn config(mut self, config: FactoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FactoryResult<Arc<FactoryRegistry>> {
        self.config.validate()?;
        let resolver = NameResolver::new(&self.config);

        tracing::debug!(factories = self.blueprints.len(), "factory registry built");

        Ok(Arc::new(FactoryRegistry {
            blueprints: self.blueprints,
            store: self.store,
            assertions: self.assertions,
            config: self.config,
            resolver,
        }))
    }
}
