//! The chainable factory
//!
//! A [`Factory`] accumulates configuration for one entity: how many records
//! to build, which attributes and states to apply, and which relationships
//! to wire. Nothing is built until [`Factory::make`] or [`Factory::create`]
//! is called; see the `build` module for the orchestration.

use std::fmt;
use std::sync::Arc;

use crate::assertions::{AssertionArgument, AssertionRequest};
use crate::error::{FactoryError, FactoryResult};
use crate::model::{Attributes, IntoAttributes, Produced, Record};
use crate::naming::CallKind;
use crate::registry::{Blueprint, FactoryRegistry};
use crate::request::{Argument, RelationshipData, RelationshipRequest};
use crate::store::Events;

mod build;

/// Callback run once per created record; the second argument is the parent
/// record when the factory was used for an owned relationship
pub type AfterCreating =
    Arc<dyn Fn(&mut Record, Option<&Record>) -> FactoryResult<()> + Send + Sync>;

/// Builder for one entity type
#[derive(Clone)]
pub struct Factory {
    registry: Arc<FactoryRegistry>,
    blueprint: Arc<dyn Blueprint>,
    entity: String,
    count: usize,
    attribute_sets: Vec<Attributes>,
    pivot_attribute_sets: Vec<Attributes>,
    states: Vec<String>,
    owning: Vec<RelationshipRequest>,
    owned: Vec<RelationshipRequest>,
    ignore_all_defaults: bool,
    ignored_defaults: Vec<String>,
    events: Events,
    after_creating: Vec<AfterCreating>,
    assertions: Vec<AssertionRequest>,
    last: Option<Produced>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |requests: &[RelationshipRequest]| -> Vec<String> {
            requests.iter().map(|r| r.name().to_string()).collect()
        };

        f.debug_struct("Factory")
            .field("name", &self.blueprint.name())
            .field("entity", &self.entity)
            .field("count", &self.count)
            .field("states", &self.states)
            .field("owning", &names(&self.owning))
            .field("owned", &names(&self.owned))
            .field("built", &self.last.is_some())
            .finish()
    }
}

impl Factory {
    /// A fresh factory producing a single record
    pub fn new(registry: &Arc<FactoryRegistry>, blueprint: Arc<dyn Blueprint>) -> Self {
        let entity = registry.entity_of(blueprint.as_ref());

        Self {
            registry: Arc::clone(registry),
            blueprint,
            entity,
            count: 1,
            attribute_sets: Vec::new(),
            pivot_attribute_sets: Vec::new(),
            states: Vec::new(),
            owning: Vec::new(),
            owned: Vec::new(),
            ignore_all_defaults: false,
            ignored_defaults: Vec::new(),
            events: Events::Dispatch,
            after_creating: Vec::new(),
            assertions: Vec::new(),
            last: None,
        }
    }

    /// A fresh factory producing `count` records
    pub fn times(
        registry: &Arc<FactoryRegistry>,
        blueprint: Arc<dyn Blueprint>,
        count: i64,
    ) -> FactoryResult<Self> {
        let count = usize::try_from(count)
            .ok()
            .filter(|count| *count >= 1)
            .ok_or(FactoryError::InvalidCount(count))?;

        let mut factory = Self::new(registry, blueprint);
        factory.count = count;
        Ok(factory)
    }

    /// Replace the attribute sets; record `i` gets set `i mod len`
    pub fn with_attributes<I>(mut self, sets: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoAttributes,
    {
        self.attribute_sets = sets.into_iter().map(IntoAttributes::into_attributes).collect();
        self
    }

    /// Replace the join-row attribute sets used when this factory feeds a
    /// many-to-many relationship
    pub fn with_pivot_attributes<I>(mut self, sets: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoAttributes,
    {
        self.pivot_attribute_sets = sets
            .into_iter()
            .map(IntoAttributes::into_attributes)
            .collect();
        self
    }

    pub fn state(mut self, name: impl Into<String>) -> Self {
        self.states.push(name.into());
        self
    }

    pub fn states<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn as_state(self, name: impl Into<String>) -> Self {
        self.state(name)
    }

    /// Configure a relationship by call name, e.g. `withCustomers` or `forUser`
    ///
    /// A literal first argument (record, records or factory) is used as-is.
    /// Otherwise an optional leading count and any attribute maps configure a
    /// factory found in the registry by naming convention.
    pub fn relate(mut self, method: &str, args: Vec<Argument>) -> FactoryResult<Self> {
        let kind = self.registry.resolver().classify(method);

        let (name, owning) = match kind {
            CallKind::Owning(name) => (name, true),
            CallKind::Owned(name) => (name, false),
            CallKind::Assertion | CallKind::Unrecognized => {
                return Err(FactoryError::NotARelationship {
                    factory: self.name().to_string(),
                    method: method.to_string(),
                });
            }
        };

        let data = self.resolve_data(method, &name, args)?;
        let request = RelationshipRequest::new(name, method, data);

        tracing::trace!(
            factory = self.name(),
            relationship = request.name(),
            owning,
            "relationship configured"
        );

        if owning {
            put_request(&mut self.owning, request);
        } else {
            put_request(&mut self.owned, request);
        }
        Ok(self)
    }

    /// Skip the named default relationships; an empty list skips all of them
    pub fn without_defaults<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            self.ignore_all_defaults = true;
        }
        self.ignored_defaults.extend(names);
        self
    }

    /// Save without dispatching lifecycle events
    pub fn without_events(mut self) -> Self {
        self.events = Events::Suppress;
        self
    }

    pub fn after_creating<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Record, Option<&Record>) -> FactoryResult<()> + Send + Sync + 'static,
    {
        self.after_creating.push(Arc::new(hook));
        self
    }

    /// Queue an assertion to run once the result is fully built
    ///
    /// The name must carry the assertion prefix; anything else is rejected
    /// before a single record is built.
    pub fn assert(
        mut self,
        name: impl Into<String>,
        arguments: Vec<AssertionArgument>,
    ) -> FactoryResult<Self> {
        let name = name.into();
        if self.registry.resolver().classify(&name) != CallKind::Assertion {
            return Err(FactoryError::NotAnAssertion {
                factory: self.name().to_string(),
                method: name,
            });
        }

        self.assertions.push(AssertionRequest::new(name, arguments));
        Ok(self)
    }

    /// Build records in memory without saving anything
    pub async fn make(&mut self, overrides: &[Attributes]) -> FactoryResult<Produced> {
        tracing::debug!(factory = self.name(), entity = %self.entity, count = self.count, "make");

        let records = self.make_records(overrides).await?;
        let produced = Produced::from_records(records, self.count == 1);
        self.last = Some(produced.clone());
        Ok(produced)
    }

    pub(crate) async fn make_records(
        &self,
        overrides: &[Attributes],
    ) -> FactoryResult<Vec<Record>> {
        let store = self.registry.store();

        if self.attribute_sets.len() <= 1 && overrides.len() <= 1 {
            return store
                .instantiate_many(
                    &self.entity,
                    &self.states,
                    self.merged(overrides, 0),
                    self.count,
                )
                .await;
        }

        let mut records = Vec::with_capacity(self.count);
        for index in 0..self.count {
            let record = store
                .instantiate(&self.entity, &self.states, self.merged(overrides, index))
                .await?;
            records.push(record);
        }
        Ok(records)
    }

    fn merged(&self, overrides: &[Attributes], index: usize) -> Attributes {
        let mut attributes = cycle(&self.attribute_sets, index);
        attributes.extend(cycle(overrides, index));
        attributes
    }

    fn resolve_data(
        &self,
        method: &str,
        relationship: &str,
        args: Vec<Argument>,
    ) -> FactoryResult<RelationshipData> {
        let mut args = args.into_iter().peekable();

        if args.peek().map_or(false, Argument::is_literal) {
            if let Some(data) = args.next().and_then(Argument::into_literal) {
                return Ok(data);
            }
        }

        let mut multiplicity = 1;
        let mut attribute_sets = Vec::new();
        for (index, arg) in args.enumerate() {
            match arg {
                Argument::Count(count) if index == 0 => multiplicity = count,
                Argument::Attributes(attributes) => attribute_sets.push(attributes),
                other => tracing::debug!(
                    factory = self.name(),
                    method,
                    argument = ?other,
                    "ignoring relationship argument"
                ),
            }
        }

        let (found, candidates) = self.registry.find_candidate(relationship);
        let Some(name) = found else {
            return Err(FactoryError::ArgumentsNotSatisfiable {
                factory: self.name().to_string(),
                method: method.to_string(),
                relationship: relationship.to_string(),
                candidates,
            });
        };

        let blueprint = self.registry.blueprint(&name)?;
        let mut factory = Factory::times(&self.registry, blueprint, multiplicity)?;
        if !attribute_sets.is_empty() {
            factory = factory.with_attributes(attribute_sets);
        }
        Ok(RelationshipData::Factory(Box::new(factory)))
    }

    /// Explicit relationships plus the blueprint defaults that still apply
    fn effective_relationships(
        &self,
    ) -> FactoryResult<(Vec<RelationshipRequest>, Vec<RelationshipRequest>)> {
        let mut owning = self.owning.clone();
        let mut owned = self.owned.clone();

        if self.ignore_all_defaults {
            return Ok((owning, owned));
        }

        let resolver = self.registry.resolver();
        for default in self.blueprint.defaults() {
            let Some(call) = resolver.default_call(default.method()) else {
                tracing::warn!(
                    factory = self.name(),
                    method = default.method(),
                    "default relationship has no default prefix"
                );
                continue;
            };

            let kind = resolver.classify(&call);
            let Some(name) = kind.relationship().map(str::to_string) else {
                tracing::warn!(
                    factory = self.name(),
                    method = default.method(),
                    "default relationship is not relationship-shaped"
                );
                continue;
            };

            if owning.iter().chain(owned.iter()).any(|request| request.name() == name) {
                continue;
            }

            if self.ignored_defaults.iter().any(|ignored| {
                *ignored == name || *ignored == call || ignored == default.method()
            }) {
                tracing::debug!(
                    factory = self.name(),
                    relationship = %name,
                    "default relationship suppressed"
                );
                continue;
            }

            let request = RelationshipRequest::new(name, call, default.build(&self.registry)?);
            match kind {
                CallKind::Owning(_) => owning.push(request),
                _ => owned.push(request),
            }
        }

        Ok((owning, owned))
    }

    pub(crate) fn not_built(&self, called: &str) -> FactoryError {
        FactoryError::ModelNotBuilt {
            factory: self.name().to_string(),
            called: called.to_string(),
            entity: self.entity.clone(),
        }
    }

    /// Registered factory name
    pub fn name(&self) -> &str {
        self.blueprint.name()
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn attribute_sets(&self) -> &[Attributes] {
        &self.attribute_sets
    }

    pub fn pivot_attribute_sets(&self) -> &[Attributes] {
        &self.pivot_attribute_sets
    }

    pub fn state_names(&self) -> &[String] {
        &self.states
    }

    pub fn owning_relationships(&self) -> &[RelationshipRequest] {
        &self.owning
    }

    pub fn owned_relationships(&self) -> &[RelationshipRequest] {
        &self.owned
    }

    /// The most recent `make`/`create` result
    pub fn last(&self) -> Option<&Produced> {
        self.last.as_ref()
    }

    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }
}

/// Attribute set for record `index`, cycling through `sets`
pub(crate) fn cycle(sets: &[Attributes], index: usize) -> Attributes {
    if sets.is_empty() {
        Attributes::new()
    } else {
        sets[index % sets.len()].clone()
    }
}

/// Later calls for the same relationship replace earlier ones in place
fn put_request(requests: &mut Vec<RelationshipRequest>, request: RelationshipRequest) {
    match requests.iter_mut().find(|existing| existing.name() == request.name()) {
        Some(existing) => *existing = request,
        None => requests.push(request),
    }
}
