//! Entity persistence facade.
//!
//! [`Persistence`] pairs one schema with one provider: statements come from
//! a fresh [`SqlBuilder`] per call and every row read back passes through
//! the schema's deserializer.

pub mod named_sql;

pub use named_sql::NamedSql;

use std::sync::Arc;

use tracing::debug;

use crate::builder::{codec, Filter, SqlBuilder};
use crate::core::schema::Schema;
use crate::core::traits::Provider;
use crate::core::value::{Entity, Statement};
use crate::error::Result;

/// CRUD access to one schema's table through one provider.
#[derive(Clone)]
pub struct Persistence {
    provider: Arc<dyn Provider>,
    schema: Arc<Schema>,
}

impl Persistence {
    pub fn new(provider: Arc<dyn Provider>, schema: Arc<Schema>) -> Self {
        Self { provider, schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.schema.clone(), self.provider.dialect())
    }

    async fn run(&self, stmt: Statement) -> Result<Vec<Entity>> {
        debug!("{}: {}", self.schema.name(), stmt.sql);
        self.provider.execute(&stmt.sql, &stmt.params).await
    }

    async fn run_rows(&self, stmt: Statement) -> Result<Vec<Entity>> {
        self.run(stmt)
            .await?
            .into_iter()
            .map(|row| codec::deserialize_row(&self.schema, row))
            .collect()
    }

    /// Insert the entity.
    pub async fn create(&self, entity: &Entity) -> Result<()> {
        let stmt = self.builder().create(entity)?;
        self.run(stmt).await?;
        Ok(())
    }

    /// Read by primary key. `None` when no row matches.
    pub async fn read(&self, entity: &Entity) -> Result<Option<Entity>> {
        let stmt = self.builder().read(entity);
        Ok(self.run_rows(stmt).await?.into_iter().next())
    }

    /// Update the entity's non-key fields by primary key.
    pub async fn update(&self, entity: &Entity) -> Result<()> {
        let stmt = self.builder().update_entity(entity)?;
        self.run(stmt).await?;
        Ok(())
    }

    /// Delete by primary key.
    pub async fn delete_entity(&self, entity: &Entity) -> Result<()> {
        let stmt = self.builder().delete_entity(entity);
        self.run(stmt).await?;
        Ok(())
    }

    /// Start a filtered query.
    pub fn query(&self) -> EntityQuery<'_> {
        EntityQuery {
            persistence: self,
            builder: self.builder(),
        }
    }
}

/// Fluent query over a [`Persistence`].
///
/// ```rust,ignore
/// let drafts = em.query().find(criteria).order_by("name").limit(Some(10), None).list().await?;
/// ```
pub struct EntityQuery<'a> {
    persistence: &'a Persistence,
    builder: SqlBuilder,
}

impl EntityQuery<'_> {
    pub fn select(mut self, fields: &str) -> Self {
        self.builder.select(fields);
        self
    }

    pub fn find(mut self, criteria: Entity) -> Self {
        self.builder.find(criteria);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.builder.filter(filter);
        self
    }

    pub fn order_by(mut self, spec: &str) -> Self {
        self.builder.order_by(spec);
        self
    }

    pub fn limit(mut self, start: Option<u64>, limit: Option<u64>) -> Self {
        self.builder.limit(start, limit);
        self
    }

    /// All matching rows.
    pub async fn list(mut self) -> Result<Vec<Entity>> {
        let stmt = self.builder.list();
        self.persistence.run_rows(stmt).await
    }

    /// First matching row.
    pub async fn first(mut self) -> Result<Option<Entity>> {
        let stmt = self.builder.first();
        Ok(self.persistence.run_rows(stmt).await?.into_iter().next())
    }

    /// Update every matching row with the entity's non-key fields.
    pub async fn update_all(mut self, entity: &Entity) -> Result<()> {
        let stmt = self.builder.update(entity)?;
        self.persistence.run(stmt).await?;
        Ok(())
    }

    /// Delete every matching row.
    pub async fn delete(mut self) -> Result<()> {
        let stmt = self.builder.delete();
        self.persistence.run(stmt).await?;
        Ok(())
    }
}
