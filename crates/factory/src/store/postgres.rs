//! PostgreSQL persistence through sqlx
//!
//! Records are written with dynamically built statements. Column names come
//! from attribute keys and are always quoted. Null attributes are written as a
//! literal `NULL` so the column type never has to be guessed for a bind.

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use super::{Events, Persistence};
use crate::error::{FactoryError, FactoryResult};
use crate::model::{Attributes, Definitions, Produced, Record, RelationKind};
use crate::naming::{foreign_key, pivot_table, table_name};

/// Quote an identifier, doubling embedded quotes
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// One `$n` placeholder per non-null value, `NULL` for the rest
fn placeholders(columns: &[(&str, &Value)]) -> Vec<String> {
    let mut bound = 0;
    columns
        .iter()
        .map(|(_, value)| {
            if value.is_null() {
                "NULL".to_string()
            } else {
                bound += 1;
                format!("${}", bound)
            }
        })
        .collect()
}

fn bound_count(columns: &[(&str, &Value)]) -> usize {
    columns.iter().filter(|(_, value)| !value.is_null()).count()
}

/// `INSERT INTO "table" (...) VALUES ($1, ...)`, optionally returning the key
pub fn insert_sql(table: &str, columns: &[(&str, &Value)], returning_id: bool) -> String {
    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
    } else {
        let names: Vec<String> = columns.iter().map(|(c, _)| quote_identifier(c)).collect();
        let placeholders = placeholders(columns);
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            names.join(", "),
            placeholders.join(", ")
        )
    };
    if returning_id {
        sql.push_str(" RETURNING \"id\"");
    }
    sql
}

/// `UPDATE "table" SET ... WHERE "id" = $n`, the key bound last
pub fn update_sql(table: &str, columns: &[(&str, &Value)]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .zip(placeholders(columns))
        .map(|((column, _), placeholder)| format!("{} = {}", quote_identifier(column), placeholder))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE \"id\" = ${}",
        quote_identifier(table),
        assignments.join(", "),
        bound_count(columns) + 1
    )
}

pub fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_identifier(table))
}

/// Every attribute except the key, sorted for stable SQL; absent keys keep column defaults
fn writable_columns(attributes: &Attributes) -> Vec<(&str, &Value)> {
    let mut columns: Vec<(&str, &Value)> = attributes
        .iter()
        .filter(|(name, _)| name.as_str() != "id")
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    columns.sort_by(|a, b| a.0.cmp(b.0));
    columns
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.as_str()),
        other => query.bind(sqlx::types::Json(other)),
    }
}

/// Persistence against a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    definitions: Definitions,
}

impl PgStore {
    pub fn new(pool: PgPool, definitions: Definitions) -> Self {
        Self { pool, definitions }
    }

    /// Connect using `TEST_DATABASE_URL` or `DATABASE_URL`
    pub async fn connect(definitions: Definitions) -> FactoryResult<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| {
                FactoryError::Persistence(
                    "TEST_DATABASE_URL or DATABASE_URL must be set".to_string(),
                )
            })?;
        let pool = PgPool::connect(&database_url).await?;
        Ok(Self::new(pool, definitions))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert(
        &self,
        table: &str,
        attributes: &Attributes,
        returning_id: bool,
    ) -> FactoryResult<Option<i64>> {
        let columns = writable_columns(attributes);
        let sql = insert_sql(table, &columns, returning_id);

        let mut query = sqlx::query(&sql);
        for (_, value) in columns.iter().filter(|(_, value)| !value.is_null()) {
            query = bind_value(query, value);
        }

        if returning_id {
            let row = query.fetch_one(&self.pool).await?;
            Ok(Some(row.try_get::<i64, _>("id")?))
        } else {
            query.execute(&self.pool).await?;
            Ok(None)
        }
    }

    async fn update(&self, table: &str, id: i64, attributes: &Attributes) -> FactoryResult<()> {
        let columns = writable_columns(attributes);
        if columns.is_empty() {
            return Ok(());
        }
        let sql = update_sql(table, &columns);

        let mut query = sqlx::query(&sql);
        for (_, value) in columns.iter().filter(|(_, value)| !value.is_null()) {
            query = bind_value(query, value);
        }
        query.bind(id).execute(&self.pool).await?;
        Ok(())
    }

    fn stamp(&self, record: &mut Record, inserting: bool) {
        let uses_timestamps = self
            .definitions
            .get(record.entity())
            .map(|definition| definition.uses_timestamps())
            .unwrap_or(false);
        if uses_timestamps {
            let now = chrono::Utc::now().to_rfc3339();
            if inserting {
                record.set("created_at", now.clone());
            }
            record.set("updated_at", now);
        }
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
impl Persistence for PgStore {
    async fn instantiate(
        &self,
        entity: &str,
        states: &[String],
        attributes: Attributes,
    ) -> FactoryResult<Record> {
        self.definitions.instantiate(entity, states, attributes)
    }

    // The database has no model events; `events` only matters to adapters with observers
    async fn save_with(&self, record: &mut Record, _events: Events) -> FactoryResult<()> {
        let table = table_name(record.entity());

        if let Some(id) = record.id().filter(|_| record.exists()) {
            self.stamp(record, false);
            return self.update(&table, id, record.attributes()).await;
        }

        self.stamp(record, true);
        let id = self
            .insert(&table, record.attributes(), true)
            .await?
            .ok_or_else(|| {
                FactoryError::Persistence(format!("insert into {} returned no key", table))
            })?;
        record.mark_saved(id);

        tracing::trace!(table = %table, id, "postgres insert");
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
                self.insert(&pivot_table(parent.entity(), related.entity()), &row, false)
                    .await?;
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
        let count: i64 = sqlx::query_scalar(&count_sql(&table_name(entity)))
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn invoke(
        &self,
        target: &Produced,
        method: &str,
        _args: &[Value],
    ) -> FactoryResult<Option<Value>> {
        match (method, target) {
            ("count", _) => Ok(Some(json!(target.len()))),
            ("getKey" | "get_key", Produced::One(record)) => Ok(Some(json!(record.id()))),
            _ => Ok(None),
        }
    }
}
