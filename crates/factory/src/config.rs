//! Factory configuration
//!
//! Naming conventions used to map builder calls onto relationships and
//! factories onto models. Defaults match the conventional `withX`/`hasX`/`forX`
//! call style; every value can be overridden from the environment.

use std::env;

/// Configuration errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

/// Conventions the factory engine resolves names with
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryConfig {
    /// Prefix prepended to conventional model names (e.g. `app::models::`)
    pub models_namespace: String,
    /// Suffix stripped from factory names to find the model (`UserFactory` -> `User`)
    pub factory_suffix: String,
    /// Call prefixes for relationships where the built entity holds the foreign key
    pub owning_prefixes: Vec<String>,
    /// Call prefixes for relationships where the related entity points back
    pub owned_prefixes: Vec<String>,
    /// Prefix of default relationship declarations (`defaultForUser`)
    pub default_prefix: String,
    /// Prefix of deferred assertion calls (`assertEquals`)
    pub assertion_prefix: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            models_namespace: String::new(),
            factory_suffix: "Factory".to_string(),
            owning_prefixes: vec!["for".to_string()],
            owned_prefixes: vec!["with".to_string(), "has".to_string()],
            default_prefix: "default".to_string(),
            assertion_prefix: "assert".to_string(),
        }
    }
}

impl FactoryConfig {
    /// Load configuration from `POSER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup("POSER_MODELS_NAMESPACE") {
            config.models_namespace = namespace;
        }

        if let Some(suffix) = lookup("POSER_FACTORY_SUFFIX") {
            config.factory_suffix = suffix;
        }

        if let Some(prefixes) = lookup("POSER_OWNING_PREFIXES") {
            config.owning_prefixes = parse_list("owning_prefixes", &prefixes)?;
        }

        if let Some(prefixes) = lookup("POSER_OWNED_PREFIXES") {
            config.owned_prefixes = parse_list("owned_prefixes", &prefixes)?;
        }

        if let Some(prefix) = lookup("POSER_DEFAULT_PREFIX") {
            config.default_prefix = prefix;
        }

        if let Some(prefix) = lookup("POSER_ASSERTION_PREFIX") {
            config.assertion_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factory_suffix.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "factory_suffix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        for (field, value) in [
            ("default_prefix", &self.default_prefix),
            ("assertion_prefix", &self.assertion_prefix),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if self.owning_prefixes.is_empty() || self.owned_prefixes.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "relationship prefixes".to_string(),
                reason: "at least one owning and one owned prefix is required".to_string(),
            });
        }

        if let Some(shared) = self
            .owning_prefixes
            .iter()
            .find(|prefix| self.owned_prefixes.contains(prefix))
        {
            return Err(ConfigError::ValidationFailed {
                field: "relationship prefixes".to_string(),
                reason: format!("'{}' is both an owning and an owned prefix", shared),
            });
        }

        Ok(())
    }
}

fn parse_list(field: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            expected: "comma separated list of prefixes".to_string(),
        });
    }

    Ok(items)
}
