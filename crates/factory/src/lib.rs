//! # elif-factory - Declarative Test Data Factories
//!
//! Builds records for tests and seeds, wiring related records through
//! conventional relationship calls instead of hand-written setup code.
//!
//! ## Features
//!
//! - **Relationship Calls**: `forUser`, `withCustomers(3)`, `hasAddress({...})` resolved by
//!   naming convention
//! - **Two-Phase Builds**: owners are created and associated before save, owned records after
//! - **Attribute Cycling**: several attribute sets spread across a batch
//! - **Default Relationships**: baseline relationships a factory declares and callers can suppress
//! - **Deferred Assertions**: queued checks replayed against the fully wired result
//! - **Pluggable Persistence**: in-memory store for unit tests, PostgreSQL through sqlx
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use elif_factory::prelude::*;
//!
//! # async fn demo() -> FactoryResult<()> {
//! let definitions = Definitions::new()
//!     .define(ModelDefinition::new("User", || into_attributes(json!({"name": "Ada"}))))
//!     .define(ModelDefinition::new("Customer", || into_attributes(json!({"name": "Acme"}))));
//!
//! let registry = FactoryRegistry::builder(Arc::new(MemoryStore::new(definitions)))
//!     .register_named("UserFactory")
//!     .register_named("CustomerFactory")
//!     .build()?;
//!
//! let user = registry
//!     .factory("UserFactory")?
//!     .relate("withCustomers", vec![3.into()])?
//!     .create(&[])
//!     .await?;
//!
//! assert_eq!(user.as_one().map(|u| u.related("customers").len()), Some(3));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod factory;
pub mod fake_data;
pub mod model;
pub mod naming;
pub mod registry;
pub mod request;
pub mod store;

// Re-export commonly used types
pub use assertions::{
    AssertionArgument, AssertionBridge, AssertionRequest, AssertionRunner, Check, TestAssertions,
};
pub use config::{ConfigError, FactoryConfig};
pub use error::{FactoryError, FactoryResult};
pub use factory::{AfterCreating, Factory};
pub use model::{
    into_attributes, Attributes, Definitions, FactoryState, FixedState, IntoAttributes,
    ModelDefinition, Produced, Record, Relation, RelationKind, StateFn,
};
pub use naming::{CallKind, NameResolver};
pub use registry::{
    Blueprint, DefaultRelationship, FactoryRegistry, FactoryRegistryBuilder, NamedBlueprint,
};
pub use request::{Argument, RelationshipData, RelationshipRequest};
pub use store::{Events, MemoryStore, Persistence, PgStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        assertions::{AssertionArgument, Check, TestAssertions},
        error::{FactoryError, FactoryResult},
        factory::Factory,
        fake_data,
        model::{
            into_attributes, Attributes, Definitions, ModelDefinition, Produced, Record,
            RelationKind,
        },
        registry::{Blueprint, DefaultRelationship, FactoryRegistry, NamedBlueprint},
        request::{Argument, RelationshipData},
        store::{MemoryStore, Persistence},
    };

    pub use serde_json::{json, Value as JsonValue};
}
