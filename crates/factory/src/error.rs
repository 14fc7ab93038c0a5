//! Error types for the factory system
//!
//! Every failure of a single `make`/`create` call surfaces as a [`FactoryError`].
//! Persistence failures are carried through unchanged so the caller sees what
//! the storage layer reported.

use crate::config::ConfigError;

/// Result type alias for factory operations
pub type FactoryResult<T> = Result<T, FactoryError>;

/// Error types for factory configuration, building and persistence
#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    /// A relationship call could not be matched to any registered factory
    #[error(
        "{factory}::{method}() could not be satisfied: no factory found for relationship \
         '{relationship}' (looked for: {})",
        candidates.join(", ")
    )]
    ArgumentsNotSatisfiable {
        factory: String,
        method: String,
        relationship: String,
        candidates: Vec<String>,
    },

    /// A forwarded call or attribute does not exist on the produced instance
    #[error(
        "You tried to call '{called}', but it doesn't exist on {factory}. Were you trying to \
         call {entity}::{called}? If so, don't forget to call either 'create()' or 'make()' \
         on {factory}."
    )]
    ModelNotBuilt {
        factory: String,
        called: String,
        entity: String,
    },

    /// Requested multiplicity is not positive
    #[error("Factory count must be at least 1, got {0}")]
    InvalidCount(i64),

    /// `relate` was called with a name that carries no relationship prefix
    #[error("'{method}' is not a relationship call on {factory}")]
    NotARelationship { factory: String, method: String },

    /// `assert` was called with a name that carries no assertion prefix
    #[error("'{method}' is not an assertion call on {factory}")]
    NotAnAssertion { factory: String, method: String },

    /// No factory registered under the given name
    #[error("No factory registered as '{0}'")]
    UnknownFactory(String),

    /// The base factory has no definition for the entity
    #[error("Unable to locate a definition for model [{0}]")]
    UndefinedModel(String),

    /// The base factory has no such state for the entity
    #[error("Unable to locate [{state}] state for [{entity}]")]
    UndefinedState { entity: String, state: String },

    /// An owning relationship resolved to something other than a single record
    #[error(
        "Relationship '{relationship}' on {factory} must resolve to a single owner, got {found}"
    )]
    InvalidOwner {
        factory: String,
        relationship: String,
        found: String,
    },

    /// A queued assertion did not hold
    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    /// Storage layer failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FactoryError {
    /// Build an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        FactoryError::Assertion {
            message: message.into(),
        }
    }

    /// Check whether this error came from the storage layer
    pub fn is_persistence(&self) -> bool {
        matches!(self, FactoryError::Persistence(_) | FactoryError::Database(_))
    }
}
