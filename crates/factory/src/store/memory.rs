//! In-process persistence
//!
//! Keeps rows per table in memory and wires relationships by naming
//! convention. Useful for unit tests that should not need a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};

use super::{Events, Persistence};
use crate::error::{FactoryError, FactoryResult};
use crate::model::{Attributes, Definitions, Produced, Record, RelationKind};
use crate::naming::{foreign_key, pivot_table, table_name};

/// Lifecycle event kinds recorded by [`MemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Creating,
    Created,
    Updating,
    Updated,
}

/// One dispatched lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub entity: String,
    pub id: Option<i64>,
}

/// Persistence backed by in-memory tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: Definitions,
    tables: DashMap<String, Vec<Record>>,
    pivots: DashMap<String, Vec<Attributes>>,
    sequences: DashMap<String, i64>,
    events: Mutex<Vec<StoreEvent>>,
}

impl MemoryStore {
    pub fn new(definitions: Definitions) -> Self {
        Self {
            definitions,
            ..Self::default()
        }
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Stored rows of an entity, in insertion order
    pub fn rows(&self, entity: &str) -> Vec<Record> {
        self.tables
            .get(&table_name(entity))
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Stored row by primary key
    pub fn find(&self, entity: &str, id: i64) -> Option<Record> {
        self.tables
            .get(&table_name(entity))
            .and_then(|rows| rows.iter().find(|row| row.id() == Some(id)).cloned())
    }

    /// Rows of a pivot table such as `role_user`
    pub fn pivot_rows(&self, table: &str) -> Vec<Attributes> {
        self.pivots
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Lifecycle events dispatched so far
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn dispatch(&self, kind: EventKind, record: &Record) -> FactoryResult<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| FactoryError::Persistence("event log lock poisoned".to_string()))?;
        events.push(StoreEvent {
            kind,
            entity: record.entity().to_string(),
            id: record.id(),
        });
        Ok(())
    }

    fn next_id(&self, table: &str) -> i64 {
        let mut sequence = self.sequences.entry(table.to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    fn stamp(&self, record: &mut Record, inserting: bool) {
        let uses_timestamps = self
            .definitions
            .get(record.entity())
            .map(|definition| definition.uses_timestamps())
            .unwrap_or(false);

        if uses_timestamps {
            let now = Utc::now().to_rfc3339();
            if inserting {
                record.set("created_at", now.clone());
            }
            record.set("updated_at", now);
        }
    }

    fn stored_copy(record: &Record) -> Record {
        let mut row = Record::new(record.entity(), record.attributes().clone());
        if let Some(id) = record.id() {
            row.mark_saved(id);
        }
        row
    }

    fn saved_key(record: &Record, role: &str) -> FactoryResult<i64> {
        record.id().ok_or_else(|| {
            FactoryError::Persistence(format!(
                "{} {} must be saved before it can be linked",
                role,
                record.entity()
            ))
        })
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn instantiate(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
    ) -> FactoryResult<Record> {
        self.definitions.instantiate(entity, states, attributes)
    }

    async fn save_with(&self, record: &mut Record, events: Events) -> FactoryResult<()> {
        let table = table_name(record.entity());
        let dispatching = events == Events::Dispatch;

        if record.exists() {
            if dispatching {
                self.dispatch(EventKind::Updating, record)?;
            }
            self.stamp(record, false);
            let row = Self::stored_copy(record);
            let mut rows = self.tables.entry(table).or_default();
            match rows.iter_mut().find(|stored| stored.id() == record.id()) {
                Some(stored) => *stored = row,
                None => rows.push(row),
            }
            drop(rows);
            if dispatching {
                self.dispatch(EventKind::Updated, record)?;
            }
            return Ok(());
        }

        if dispatching {
            self.dispatch(EventKind::Creating, record)?;
        }
        self.stamp(record, true);
        let id = self.next_id(&table);
        record.mark_saved(id);
        self.tables
            .entry(table)
            .or_default()
            .push(Self::stored_copy(record));
        if dispatching {
            self.dispatch(EventKind::Created, record)?;
        }

        tracing::trace!(entity = record.entity(), id, "memory store insert");
        Ok(())
    }

    async fn associate_owner(
        &self,
        record: &mut Record,
        relationship: &str,
        owner: &Record,
    ) -> FactoryResult<()> {
        let owner_id = Self::saved_key(owner, "owner")?;
        record.set(foreign_key(relationship), owner_id);
        Ok(())
    }

    async fn save_owned(
        &self,
        parent: &Record,
        relationship: &str,
        related: &mut Record,
        pivot: &Attributes,
    ) -> FactoryResult<()> {
        let parent_id = Self::saved_key(parent, "parent")?;
        let kind = self
            .definitions
            .relation_kind(parent.entity(), relationship)
            .unwrap_or(RelationKind::HasMany);

        match kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                related.set(foreign_key(parent.entity()), parent_id);
                self.save(related).await
            }
            RelationKind::BelongsToMany => {
                if !related.exists() {
                    self.save(related).await?;
                }
                let related_id = Self::saved_key(related, "related")?;
                let mut row = pivot.clone();
                row.insert(foreign_key(parent.entity()), json!(parent_id));
                row.insert(foreign_key(related.entity()), json!(related_id));
                self.pivots
                    .entry(pivot_table(parent.entity(), related.entity()))
                    .or_default()
                    .push(row);
                Ok(())
            }
            RelationKind::BelongsTo => Err(FactoryError::Persistence(format!(
                "{}::{} is a belongs-to relationship and cannot save related records",
                parent.entity(),
                relationship
            ))),
        }
    }

    async fn after_create(&self, records: &mut [Record]) -> FactoryResult<()> {
        self.definitions.after_creating(records)
    }

    async fn count(&self, entity: &str) -> FactoryResult<usize> {
        Ok(self
            .tables
            .get(&table_name(entity))
            .map(|rows| rows.len())
            .unwrap_or(0))
    }

    async fn invoke(
        &self,
        target: &Produced,
        method: &str,
        _args: &[Value],
    ) -> FactoryResult<Option<Value>> {
        let value = match (method, target) {
            ("count", _) => json!(target.len()),
            ("toArray" | "to_array", _) => serde_json::to_value(target)?,
            ("getKey" | "get_key", Produced::One(record)) => json!(record.id()),
            ("exists", Produced::One(record)) => json!(record
                .id()
                .map_or(false, |id| self.find(record.entity(), id).is_some())),
            ("fresh", Produced::One(record)) => {
                let fresh = record.id().and_then(|id| self.find(record.entity(), id));
                serde_json::to_value(fresh)?
            }
            ("fresh", Produced::Many(records)) => {
                let fresh: Vec<Option<Record>> = records
                    .iter()
                    .map(|record| record.id().and_then(|id| self.find(record.entity(), id)))
                    .collect();
                serde_json::to_value(fresh)?
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{into_attributes, ModelDefinition};

    fn store() -> MemoryStore {
        MemoryStore::new(
            Definitions::new()
                .define(
                    ModelDefinition::new("User", || into_attributes(json!({"name": "Ada"})))
                        .relation("roles", RelationKind::BelongsToMany)
                        .relation("team", RelationKind::BelongsTo)
                        .with_timestamps(),
                )
                .define(ModelDefinition::new("Customer", || {
                    into_attributes(json!({"name": "Acme"}))
                }))
                .define(ModelDefinition::new("Role", || {
                    into_attributes(json!({"label": "admin"}))
                })),
        )
    }

    #[tokio::test]
    async fn test_insert_then_update() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;

        store.save(&mut user).await?;
        assert_eq!(user.id(), Some(1));
        assert!(user.get("created_at").is_some());

        user.set("name", "Grace");
        store.save(&mut user).await?;

        assert_eq!(store.count("User").await?, 1);
        assert_eq!(store.find("User", 1).unwrap().get_str("name"), Some("Grace"));

        let kinds: Vec<EventKind> = store.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Creating, EventKind::Created, EventKind::Updating, EventKind::Updated]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_suppressed_events_still_write() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;

        store.save_with(&mut user, Events::Suppress).await?;

        assert!(store.events().is_empty());
        assert_eq!(store.count("User").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_has_many_sets_parent_key() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;
        store.save(&mut user).await?;
        let mut customer = store.instantiate("Customer", &[], Attributes::new()).await?;

        store
            .save_owned(&user, "customers", &mut customer, &Attributes::new())
            .await?;

        assert!(customer.exists());
        assert_eq!(customer.get("user_id"), Some(&json!(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_belongs_to_many_writes_pivot() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;
        store.save(&mut user).await?;
        let mut role = store.instantiate("Role", &[], Attributes::new()).await?;

        store
            .save_owned(&user, "roles", &mut role, &into_attributes(json!({"expires": "never"})))
            .await?;

        let pivots = store.pivot_rows("role_user");
        assert_eq!(pivots.len(), 1);
        assert_eq!(pivots[0].get("user_id"), Some(&json!(1)));
        assert_eq!(pivots[0].get("role_id"), Some(&json!(1)));
        assert_eq!(pivots[0].get("expires"), Some(&json!("never")));
        Ok(())
    }

    #[tokio::test]
    async fn test_linking_requires_saved_records() -> FactoryResult<()> {
        let store = store();
        let owner = store.instantiate("User", &[], Attributes::new()).await?;
        let mut customer = store.instantiate("Customer", &[], Attributes::new()).await?;

        let associate = store.associate_owner(&mut customer, "user", &owner).await;
        assert!(matches!(associate, Err(FactoryError::Persistence(_))));

        let owned = store
            .save_owned(&owner, "customers", &mut customer, &Attributes::new())
            .await;
        assert!(matches!(owned, Err(FactoryError::Persistence(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_belongs_to_cannot_save_related() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;
        store.save(&mut user).await?;
        let mut team = Record::new("Team", Attributes::new());

        let result = store.save_owned(&user, "team", &mut team, &Attributes::new()).await;

        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_invoke() -> FactoryResult<()> {
        let store = store();
        let mut user = store.instantiate("User", &[], Attributes::new()).await?;
        store.save(&mut user).await?;
        let produced = Produced::One(user);

        assert_eq!(store.invoke(&produced, "exists", &[]).await?, Some(json!(true)));
        assert_eq!(store.invoke(&produced, "getKey", &[]).await?, Some(json!(1)));
        let fresh = store.invoke(&produced, "fresh", &[]).await?.unwrap();
        assert_eq!(fresh["attributes"]["name"], json!("Ada"));
        assert_eq!(store.invoke(&produced, "explode", &[]).await?, None);
        Ok(())
    }
}
