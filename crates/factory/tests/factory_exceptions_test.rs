mod support;

use std::sync::Arc;

use async_trait::async_trait;
use elif_factory::prelude::*;
use elif_factory::store::Events;

use support::{definitions, fixture, registry_builder};

#[tokio::test]
async fn test_unknown_relationship_is_not_satisfiable() -> FactoryResult<()> {
    let f = fixture();

    let error = f.factory("UserFactory").relate("withPets", vec![10.into()]).unwrap_err();

    match &error {
        FactoryError::ArgumentsNotSatisfiable {
            factory,
            method,
            relationship,
            candidates,
        } => {
            assert_eq!(factory, "UserFactory");
            assert_eq!(method, "withPets");
            assert_eq!(relationship, "pets");
            assert_eq!(candidates, &vec!["Pet".to_string(), "PetFactory".to_string()]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(error.to_string().contains("Pet, PetFactory"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_relationship_without_arguments() {
    let f = fixture();

    let result = f.factory("UserFactory").relate("withProfile", vec![]);

    assert!(matches!(
        result,
        Err(FactoryError::ArgumentsNotSatisfiable { relationship, .. }) if relationship == "profile"
    ));
}

#[tokio::test]
async fn test_non_positive_counts_are_rejected() {
    let f = fixture();

    assert!(matches!(
        f.registry.factory_times("UserFactory", 0),
        Err(FactoryError::InvalidCount(0))
    ));
    assert!(matches!(
        f.factory("UserFactory").relate("withCustomers", vec![(-1).into()]),
        Err(FactoryError::InvalidCount(-1))
    ));
}

#[tokio::test]
async fn test_plain_names_are_not_relationships() {
    let f = fixture();

    for method in ["format", "save", "assertEquals"] {
        assert!(matches!(
            f.factory("UserFactory").relate(method, vec![]),
            Err(FactoryError::NotARelationship { .. })
        ));
    }
}

#[tokio::test]
async fn test_missing_attribute_is_model_not_built() -> FactoryResult<()> {
    let f = fixture();
    let mut factory = f.factory("UserFactory");

    let error = factory.attribute("nickname").await.unwrap_err();

    assert!(matches!(
        &error,
        FactoryError::ModelNotBuilt { factory, called, entity }
            if factory == "UserFactory" && called == "nickname" && entity == "User"
    ));
    assert!(error.to_string().contains("don't forget to call either 'create()' or 'make()'"));
    // The implicit build still happened
    assert_eq!(f.store.count("User").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_unsupported_forward_is_model_not_built() {
    let f = fixture();
    let mut factory = f.factory("UserFactory");

    assert!(matches!(
        factory.forward("explode", &[]).await,
        Err(FactoryError::ModelNotBuilt { called, .. }) if called == "explode"
    ));
}

#[tokio::test]
async fn test_attribute_on_a_collection_is_model_not_built() {
    let f = fixture();
    let mut factory = f.times("UserFactory", 2);

    assert!(matches!(
        factory.attribute("name").await,
        Err(FactoryError::ModelNotBuilt { .. })
    ));
}

#[tokio::test]
async fn test_owner_must_be_a_single_record() -> FactoryResult<()> {
    let f = fixture();
    let owners = f.times("UserFactory", 2);

    let result = f
        .factory("CustomerFactory")
        .relate("forUser", vec![owners.into()])?
        .create(&[])
        .await;

    assert!(matches!(
        result,
        Err(FactoryError::InvalidOwner { relationship, .. }) if relationship == "user"
    ));
    Ok(())
}

#[tokio::test]
async fn test_unsaved_literal_owner_is_rejected() -> FactoryResult<()> {
    let f = fixture();
    let owner = f.factory("UserFactory").make(&[]).await?.into_one().unwrap();

    let result = f
        .factory("CustomerFactory")
        .relate("forUser", vec![owner.into()])?
        .create(&[])
        .await;

    assert!(matches!(result, Err(ref error) if error.is_persistence()));
    assert_eq!(f.store.count("Customer").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_state_fails_the_build() {
    let f = fixture();

    let result = f.factory("UserFactory").state("banned").create(&[]).await;

    assert!(matches!(
        result,
        Err(FactoryError::UndefinedState { state, .. }) if state == "banned"
    ));
}

#[tokio::test]
async fn test_failed_assertion_surfaces() -> FactoryResult<()> {
    let f = fixture();
    let mut factory = f
        .factory("UserFactory")
        .with_attributes([json!({"name": "John"})])
        .assert("assertEquals", vec!["Jane".into(), "name".into()])?;

    let result = factory.create(&[]).await;

    assert!(matches!(result, Err(FactoryError::Assertion { .. })));
    // The records were still written and recorded
    assert_eq!(f.store.count("User").await?, 1);
    assert!(factory.last().is_some());
    Ok(())
}

#[tokio::test]
async fn test_misspelled_assertion_is_rejected_before_building() -> FactoryResult<()> {
    let f = fixture();

    let result = f
        .factory("UserFactory")
        .assert("asertEquals", vec!["Jane".into(), "name".into()]);

    assert!(matches!(
        result,
        Err(FactoryError::NotAnAssertion { method, .. }) if method == "asertEquals"
    ));
    assert_eq!(f.store.count("User").await?, 0);
    Ok(())
}

/// Delegates to a memory store but refuses to save one entity
struct FailingStore {
    inner: MemoryStore,
    entity: &'static str,
}

#[async_trait]
impl Persistence for FailingStore {
    async fn instantiate(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
    ) -> FactoryResult<Record> {
        self.inner.instantiate(entity, states, attributes).await
    }

    async fn save_with(&self, record: &mut Record, events: Events) -> FactoryResult<()> {
        if record.entity() == self.entity {
            return Err(FactoryError::Persistence("disk full".to_string()));
        }
        self.inner.save_with(record, events).await
    }

    async fn associate_owner(
        &self,
        record: &mut Record,
        relationship: &str,
        owner: &Record,
    ) -> FactoryResult<()> {
        self.inner.associate_owner(record, relationship, owner).await
    }

    async fn save_owned(
        &self,
        parent: &Record,
        relationship: &str,
        related: &mut Record,
        pivot: &Attributes,
    ) -> FactoryResult<()> {
        if related.entity() == self.entity {
            return Err(FactoryError::Persistence("disk full".to_string()));
        }
        self.inner.save_owned(parent, relationship, related, pivot).await
    }

    async fn after_create(&self, records: &mut [Record]) -> FactoryResult<()> {
        self.inner.after_create(records).await
    }

    async fn count(&self, entity: &str) -> FactoryResult<usize> {
        self.inner.count(entity).await
    }
}

#[tokio::test]
async fn test_persistence_errors_propagate_without_rollback() -> FactoryResult<()> {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(definitions()),
        entity: "Customer",
    });
    let registry = registry_builder(store.clone()).build()?;

    let result = registry
        .factory("UserFactory")?
        .relate("withCustomers", vec![2.into()])?
        .create(&[])
        .await;

    match result {
        Err(FactoryError::Persistence(message)) => assert_eq!(message, "disk full"),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(store.count("User").await?, 1);
    assert_eq!(store.count("Customer").await?, 0);
    Ok(())
}
