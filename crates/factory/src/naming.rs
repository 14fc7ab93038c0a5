//! Name resolution for builder calls
//!
//! Maps a call name such as `withCustomers` or `for_user` onto a relationship
//! classification and accessor name, and derives the conventional factory names
//! that may satisfy that relationship.

use crate::config::FactoryConfig;

/// Classification of a builder call name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// The built entity holds the foreign key (`forUser`)
    Owning(String),
    /// The related entity or a join row points back (`withCustomers`, `hasAddress`)
    Owned(String),
    /// A deferred assertion (`assertEquals`)
    Assertion,
    /// Anything else
    Unrecognized,
}

impl CallKind {
    /// Relationship accessor name, if this is a relationship call
    pub fn relationship(&self) -> Option<&str> {
        match self {
            CallKind::Owning(name) | CallKind::Owned(name) => Some(name),
            _ => None,
        }
    }
}

/// Prefix dispatch table built from [`FactoryConfig`]
#[derive(Debug, Clone)]
pub struct NameResolver {
    owning_prefixes: Vec<String>,
    owned_prefixes: Vec<String>,
    default_prefix: String,
    assertion_prefix: String,
    factory_suffix: String,
    models_namespace: String,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(&FactoryConfig::default())
    }
}

impl NameResolver {
    pub fn new(config: &FactoryConfig) -> Self {
        let mut owning_prefixes = config.owning_prefixes.clone();
        let mut owned_prefixes = config.owned_prefixes.clone();
        // Longest first so that overlapping prefixes pick the most specific one
        owning_prefixes.sort_by_key(|prefix| std::cmp::Reverse(prefix.len()));
        owned_prefixes.sort_by_key(|prefix| std::cmp::Reverse(prefix.len()));

        Self {
            owning_prefixes,
            owned_prefixes,
            default_prefix: config.default_prefix.clone(),
            assertion_prefix: config.assertion_prefix.clone(),
            factory_suffix: config.factory_suffix.clone(),
            models_namespace: config.models_namespace.clone(),
        }
    }

    /// Classify a call name
    pub fn classify(&self, method: &str) -> CallKind {
        if strip_call_prefix(method, &self.assertion_prefix).is_some() {
            return CallKind::Assertion;
        }

        if let Some(name) = self.match_prefixes(method, &self.owning_prefixes) {
            return CallKind::Owning(name);
        }

        if let Some(name) = self.match_prefixes(method, &self.owned_prefixes) {
            return CallKind::Owned(name);
        }

        CallKind::Unrecognized
    }

    /// Relationship accessor name for a call, if it is relationship-shaped
    pub fn relationship_name(&self, method: &str) -> Option<String> {
        self.classify(method).relationship().map(str::to_string)
    }

    /// Strip the default-declaration prefix: `defaultForUser` -> `ForUser` -> `forUser`
    pub fn default_call(&self, method: &str) -> Option<String> {
        strip_call_prefix(method, &self.default_prefix).map(|rest| lower_first(&rest))
    }

    /// Factory names that may build the related entity, most specific last
    pub fn candidates(&self, relationship: &str) -> Vec<String> {
        let base = studly_case(&singularize(relationship));
        vec![base.clone(), format!("{}{}", base, self.factory_suffix)]
    }

    /// Conventional entity name for a factory (`UserFactory` -> `User`)
    pub fn entity_for(&self, factory_name: &str) -> String {
        let base = factory_name
            .strip_suffix(self.factory_suffix.as_str())
            .filter(|base| !base.is_empty())
            .unwrap_or(factory_name);

        format!("{}{}", self.models_namespace, base)
    }

    fn match_prefixes(&self, method: &str, prefixes: &[String]) -> Option<String> {
        prefixes
            .iter()
            .find_map(|prefix| strip_call_prefix(method, prefix))
            .map(|rest| camel_case(&rest))
    }
}

/// Strip `prefix` when what follows starts a new word (`withX`, `with_x`)
fn strip_call_prefix(method: &str, prefix: &str) -> Option<String> {
    let rest = method.strip_prefix(prefix)?;
    let rest = match rest.strip_prefix('_') {
        Some(snake) => snake,
        None if rest.chars().next().map_or(false, |c| c.is_uppercase()) => rest,
        None => return None,
    };

    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Convert `BillingAddress`, `billing_address` or `billingAddress` to `billingAddress`
pub fn camel_case(s: &str) -> String {
    lower_first(&studly_case(s))
}

/// Convert `billing_address` or `billingAddress` to `BillingAddress`
pub fn studly_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(upper_first)
        .collect()
}

/// Convert `BillingAddress` or `billingAddress` to `billing_address`
pub fn snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Simple English singularization
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }

    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    // `statuses`, `buses`; `houses` and `causes` keep their `e`
    if let Some(stem) = word.strip_suffix("uses") {
        if !stem.is_empty() && !stem.ends_with(|c: char| "aeiou".contains(c)) {
            return format!("{}us", stem);
        }
    }

    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }

    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Simple English pluralization
pub fn pluralize(word: &str) -> String {
    if word.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|v| word.ends_with(v))
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Last path segment of an entity name (`app::models::User` -> `User`)
pub fn entity_basename(entity: &str) -> &str {
    entity.rsplit("::").next().unwrap_or(entity)
}

/// Conventional table name (`BillingAddress` -> `billing_addresses`)
pub fn table_name(entity: &str) -> String {
    pluralize(&snake_case(entity_basename(entity)))
}

/// Conventional foreign key column (`user` or `User` -> `user_id`)
pub fn foreign_key(name: &str) -> String {
    format!("{}_id", snake_case(&singularize(entity_basename(name))))
}

/// Conventional pivot table: both singular snake names, alphabetical (`role_user`)
pub fn pivot_table(left: &str, right: &str) -> String {
    let mut names = [
        snake_case(&singularize(entity_basename(left))),
        snake_case(&singularize(entity_basename(right))),
    ];
    names.sort();
    names.join("_")
}
