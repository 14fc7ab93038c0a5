//! Shared fixtures: User/Customer/Address/Role/Post/Comment models over a memory store

#![allow(dead_code)]

use std::sync::Arc;

use elif_factory::prelude::*;
use elif_factory::FactoryRegistryBuilder;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn definitions() -> Definitions {
    Definitions::new()
        .define(
            ModelDefinition::new("User", || {
                into_attributes(json!({
                    "name": fake_data::name(),
                    "email": fake_data::email(),
                    "active": true,
                    "email_verified_at": "2020-01-01T00:00:00Z",
                }))
            })
            .state("inactive", json!({"active": false}))
            .state("unverified", json!({"email_verified_at": null}))
            .relation("address", RelationKind::HasOne)
            .relation("customers", RelationKind::HasMany)
            .relation("roles", RelationKind::BelongsToMany)
            .with_timestamps(),
        )
        .define(
            ModelDefinition::new("Customer", || {
                into_attributes(json!({ "name": fake_data::name() }))
            })
            .relation("user", RelationKind::BelongsTo)
            .relation("address", RelationKind::HasOne),
        )
        .define(
            ModelDefinition::new("Address", || {
                into_attributes(json!({ "line_1": fake_data::street_address() }))
            })
            .relation("user", RelationKind::BelongsTo),
        )
        .define(ModelDefinition::new("Role", || {
            into_attributes(json!({ "label": fake_data::word() }))
        }))
        .define(
            ModelDefinition::new("Post", || {
                into_attributes(json!({ "title": fake_data::sentence(3) }))
            })
            .relation("user", RelationKind::BelongsTo)
            .relation("comments", RelationKind::HasMany),
        )
        .define(ModelDefinition::new("Comment", || {
            into_attributes(json!({ "body": fake_data::sentence(6) }))
        }))
}

/// Blueprint with a default owner and default owned comments
pub struct PostFactory;

impl Blueprint for PostFactory {
    fn name(&self) -> &str {
        "PostFactory"
    }

    fn defaults(&self) -> Vec<DefaultRelationship> {
        vec![
            DefaultRelationship::new("defaultForUser", |registry| {
                Ok(registry.factory("UserFactory")?.into())
            }),
            DefaultRelationship::new("defaultWithComments", |registry| {
                Ok(registry.factory_times("CommentFactory", 2)?.into())
            }),
        ]
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<FactoryRegistry>,
}

impl Fixture {
    pub fn factory(&self, name: &str) -> Factory {
        self.registry.factory(name).unwrap()
    }

    pub fn times(&self, name: &str, count: i64) -> Factory {
        self.registry.factory_times(name, count).unwrap()
    }
}

pub fn registry_builder(store: Arc<dyn Persistence>) -> FactoryRegistryBuilder {
    FactoryRegistry::builder(store)
        .register_named("UserFactory")
        .register_named("CustomerFactory")
        .register_named("AddressFactory")
        .register_named("Role")
        .register_named("CommentFactory")
        .register(PostFactory)
}

pub fn fixture() -> Fixture {
    init_tracing();

    let store = Arc::new(MemoryStore::new(definitions()));
    let registry = registry_builder(store.clone()).build().unwrap();

    Fixture { store, registry }
}
