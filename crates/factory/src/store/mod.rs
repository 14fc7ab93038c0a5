//! Persistence contract consumed by factories
//!
//! The factory engine decides *when* records are instantiated, saved and
//! linked; a [`Persistence`] implementation decides *how*.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FactoryResult;
use crate::model::{Attributes, Produced, Record};

pub mod memory;
pub mod postgres;

pub use memory::{EventKind, MemoryStore, StoreEvent};
pub use postgres::PgStore;

/// Whether a save should dispatch lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Events {
    #[default]
    Dispatch,
    Suppress,
}

/// ORM operations a factory needs
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Instantiate an unsaved record from the model definition
    async fn instantiate(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
    ) -> FactoryResult<Record>;

    /// Instantiate `count` unsaved records with the same attributes
    async fn instantiate_many(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
        count: usize,
    ) -> FactoryResult<Vec<Record>> {
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(self.instantiate(entity, states, attributes.clone()).await?);
        }
        Ok(records)
    }

    /// Insert or update a record
    async fn save_with(&self, record: &mut Record, events: Events) -> FactoryResult<()>;

    async fn save(&self, record: &mut Record) -> FactoryResult<()> {
        self.save_with(record, Events::Dispatch).await
    }

    /// Point `record`'s owning relationship at `owner` (sets the foreign key, does not save)
    async fn associate_owner(
        &self,
        record: &mut Record,
        relationship: &str,
        owner: &Record,
    ) -> FactoryResult<()>;

    /// Save `related` through `parent`'s relationship accessor
    async fn save_owned(
        &self,
        parent: &Record,
        relationship: &str,
        related: &mut Record,
        pivot: &Attributes,
    ) -> FactoryResult<()>;

    /// Fire the ORM's own after-creating hooks once for a whole batch
    async fn after_create(&self, records: &mut [Record]) -> FactoryResult<()>;

    /// Number of stored rows for an entity
    async fn count(&self, entity: &str) -> FactoryResult<usize>;

    /// Forward an arbitrary call to produced records; `None` when unsupported
    async fn invoke(
        &self,
        _target: &Produced,
        _method: &str,
        _args: &[Value],
    ) -> FactoryResult<Option<Value>> {
        Ok(None)
    }
}
