//! Build orchestration
//!
//! `create` runs in two phases. Owning relationships are resolved and
//! associated before each record is saved; owned relationships are built and
//! saved against the parent afterwards, recursing through nested factories.
//! A [`BuildContext`] travels through the whole graph so an owner requested
//! under the same relationship name is created only once per `create` call,
//! and literal owned records are saved once and then re-pointed at each
//! later parent instead of being copied.

use std::collections::HashMap;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::{cycle, Factory};
use crate::assertions::AssertionRunner;
use crate::error::{FactoryError, FactoryResult};
use crate::model::{Attributes, Produced, Record, Relation};
use crate::request::{RelationshipData, RelationshipRequest};

/// State shared by one `create` call
#[derive(Debug, Default)]
pub(crate) struct BuildContext {
    /// Owners created so far, by relationship name
    owners: HashMap<String, Record>,
    /// Literal owned records as last saved, by factory and relationship name
    literals: HashMap<(String, String), Vec<Record>>,
}

impl Factory {
    /// Build, save and wire records, then replay queued assertions
    pub async fn create(&mut self, overrides: &[Attributes]) -> FactoryResult<Produced> {
        let mut context = BuildContext::default();
        let produced = self.persist(&mut context, overrides).await?;

        self.last = Some(produced.clone());
        self.replay_assertions(&produced)?;
        Ok(produced)
    }

    /// Shorthand for `create` without overrides
    pub async fn invoke(&mut self) -> FactoryResult<Produced> {
        self.create(&[]).await
    }

    /// Field of the built record, creating it first if nothing was built yet
    pub async fn attribute(&mut self, field: &str) -> FactoryResult<Value> {
        let value = match self.ensure_built().await? {
            Produced::One(record) => record.field(field),
            Produced::Many(_) => None,
        };
        value.ok_or_else(|| self.not_built(field))
    }

    /// Loaded relationship of the built record, creating it first if needed
    pub async fn relation(&mut self, name: &str) -> FactoryResult<Relation> {
        let relation = match self.ensure_built().await? {
            Produced::One(record) => record.relation(name).cloned(),
            Produced::Many(_) => None,
        };
        relation.ok_or_else(|| self.not_built(name))
    }

    /// Forward a call to the built result through the persistence layer
    pub async fn forward(&mut self, method: &str, args: &[Value]) -> FactoryResult<Value> {
        let produced = self.ensure_built().await?.clone();

        tracing::trace!(factory = self.name(), method, "forwarding call to built result");

        self.registry
            .store()
            .invoke(&produced, method, args)
            .await?
            .ok_or_else(|| self.not_built(method))
    }

    async fn ensure_built(&mut self) -> FactoryResult<&Produced> {
        if self.last.is_none() {
            self.create(&[]).await?;
        }
        self.last.as_ref().ok_or_else(|| self.not_built("create"))
    }

    fn replay_assertions(&self, produced: &Produced) -> FactoryResult<()> {
        if self.assertions.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            factory = self.name(),
            assertions = self.assertions.len(),
            "replaying assertions"
        );
        AssertionRunner::new(self.registry.assertions()).replay(&self.assertions, produced)
    }

    /// Create used for an owner: shares the caller's context and runs this factory's assertions
    fn create_nested<'a>(
        &'a self,
        context: &'a mut BuildContext,
    ) -> BoxFuture<'a, FactoryResult<Produced>> {
        async move {
            let produced = self.persist(context, &[]).await?;
            self.replay_assertions(&produced)?;
            Ok(produced)
        }
        .boxed()
    }

    fn persist<'a>(
        &'a self,
        context: &'a mut BuildContext,
        overrides: &'a [Attributes],
    ) -> BoxFuture<'a, FactoryResult<Produced>> {
        async move {
            let (owning, owned) = self.effective_relationships()?;
            let store = self.registry.store();

            tracing::debug!(
                factory = self.name(),
                entity = %self.entity,
                count = self.count,
                owning = owning.len(),
                owned = owned.len(),
                "create"
            );

            let mut records = self.make_records(overrides).await?;

            for record in records.iter_mut() {
                for request in &owning {
                    let owner = self.resolve_owner(context, request).await?;
                    store.associate_owner(record, request.name(), &owner).await?;
                    record.set_relation(request.name(), Relation::One(Box::new(owner)));
                }
                store.save_with(record, self.events).await?;
                tracing::trace!(entity = record.entity(), id = ?record.id(), "record saved");
            }

            store.after_create(&mut records).await?;
            for record in records.iter_mut() {
                for hook in &self.after_creating {
                    hook(record, None)?;
                }
            }

            for record in records.iter_mut() {
                self.attach_owned(&owned, record, context).await?;
            }

            Ok(Produced::from_records(records, self.count == 1))
        }
        .boxed()
    }

    async fn resolve_owner(
        &self,
        context: &mut BuildContext,
        request: &RelationshipRequest,
    ) -> FactoryResult<Record> {
        match request.data() {
            RelationshipData::Record(owner) => Ok(owner.clone()),
            RelationshipData::Records(owners) => {
                Err(self.invalid_owner(request, format!("{} literal records", owners.len())))
            }
            RelationshipData::Factory(factory) => {
                if let Some(owner) = context.owners.get(request.name()) {
                    tracing::trace!(relationship = request.name(), "reusing owner");
                    return Ok(owner.clone());
                }

                tracing::debug!(
                    factory = self.name(),
                    relationship = request.name(),
                    owner = factory.name(),
                    "creating owner"
                );

                let owner = match factory.create_nested(context).await? {
                    Produced::One(owner) => owner,
                    Produced::Many(owners) => {
                        let found = format!("{} records", owners.len());
                        return Err(self.invalid_owner(request, found));
                    }
                };
                context
                    .owners
                    .insert(request.name().to_string(), owner.clone());
                Ok(owner)
            }
        }
    }

    /// Build and save owned relationships against `parent`, then recurse into nested factories
    fn attach_owned<'a>(
        &'a self,
        owned: &'a [RelationshipRequest],
        parent: &'a mut Record,
        context: &'a mut BuildContext,
    ) -> BoxFuture<'a, FactoryResult<()>> {
        async move {
            let store = self.registry.store();

            for request in owned {
                tracing::debug!(
                    factory = self.name(),
                    relationship = request.name(),
                    parent = parent.entity(),
                    "resolving owned relationship"
                );

                let literal_key = (self.name().to_string(), request.name().to_string());
                let literal = |records: &[Record]| {
                    context
                        .literals
                        .get(&literal_key)
                        .cloned()
                        .unwrap_or_else(|| records.to_vec())
                };

                let (related, nested) = match request.data() {
                    RelationshipData::Record(record) => {
                        (Produced::from_records(literal(std::slice::from_ref(record)), true), None)
                    }
                    RelationshipData::Records(records) => {
                        (Produced::from_records(literal(records), false), None)
                    }
                    RelationshipData::Factory(factory) => {
                        let records = factory.make_records(&[]).await?;
                        (
                            Produced::from_records(records, factory.count == 1),
                            Some(factory.as_ref()),
                        )
                    }
                };

                let single = related.is_single();
                let mut items = related.into_records();

                for (index, item) in items.iter_mut().enumerate() {
                    if let Some(factory) = nested {
                        for owning in &factory.owning {
                            let owner = factory.resolve_owner(context, owning).await?;
                            store.associate_owner(item, owning.name(), &owner).await?;
                            item.set_relation(owning.name(), Relation::One(Box::new(owner)));
                        }
                    }

                    let pivot = nested
                        .map(|factory| cycle(&factory.pivot_attribute_sets, index))
                        .unwrap_or_default();
                    store.save_owned(parent, request.name(), item, &pivot).await?;
                }

                match nested {
                    Some(factory) => {
                        for item in items.iter_mut() {
                            for hook in &factory.after_creating {
                                hook(item, Some(&*parent))?;
                            }
                            factory.attach_owned(&factory.owned, item, context).await?;
                        }
                    }
                    None => {
                        context.literals.insert(literal_key, items.clone());
                    }
                }

                parent.set_relation(
                    request.name(),
                    Produced::from_records(items, single).into_relation(),
                );
            }

            Ok(())
        }
        .boxed()
    }

    fn invalid_owner(&self, request: &RelationshipRequest, found: String) -> FactoryError {
        FactoryError::InvalidOwner {
            factory: self.name().to_string(),
            relationship: request.name().to_string(),
            found,
        }
    }
}
