#![forbid(unsafe_code)]

//! Entity repository: compiles, executes and maps in one call.
//!
//! Writes are validated before they run (related ids must exist) and read
//! back afterwards so callers always see the stored shape. Misses on scoped
//! entities are split into "forbidden" and "not found" with one extra
//! unscoped existence query.

/// Row to entity mapping.
pub mod mapper;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

pub use mapper::{JsonRecordMapper, RecordMapper};

use crate::client::{ExecutionClient, Row};
use crate::error::{GraphError, Result};
use crate::pagination::{Cursor, Page};
use crate::query::{
    missing_from_rows, CompilerSettings, FindParams, QueryCompiler, RequestContext, Statement,
    WriteInput, WriteMode,
};
use crate::schema::EntityDescriptor;

/// Reads and writes one entity type.
pub struct EntityRepository<M: RecordMapper = JsonRecordMapper> {
    descriptor: Arc<EntityDescriptor>,
    settings: CompilerSettings,
    client: Arc<ExecutionClient>,
    mapper: M,
}

impl EntityRepository<JsonRecordMapper> {
    /// Repository producing JSON entities.
    pub fn new(
        descriptor: Arc<EntityDescriptor>,
        client: Arc<ExecutionClient>,
        settings: CompilerSettings,
    ) -> Self {
        Self::with_mapper(descriptor, client, settings, JsonRecordMapper)
    }
}

impl<M: RecordMapper> EntityRepository<M> {
    /// Repository with a custom mapper.
    pub fn with_mapper(
        descriptor: Arc<EntityDescriptor>,
        client: Arc<ExecutionClient>,
        settings: CompilerSettings,
        mapper: M,
    ) -> Self {
        Self {
            descriptor,
            settings,
            client,
            mapper,
        }
    }

    /// Descriptor this repository serves.
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Compiler bound to this repository's descriptor.
    pub fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(&self.descriptor, &self.settings)
    }

    /// Reads the request's paging parameters, falling back to the
    /// configured page size when `take` is absent.
    pub fn cursor_from_query(&self, query: &HashMap<String, String>) -> Result<Cursor> {
        Cursor::from_query_with(query, self.settings.default_take)
    }

    /// One page of entities plus the total count.
    pub async fn find(
        &self,
        ctx: &RequestContext,
        params: &FindParams,
        cursor: &Cursor,
    ) -> Result<Page<M::Entity>> {
        let statement = self.compiler().find(ctx, params)?;
        self.page(&statement, cursor).await
    }

    /// One page of entities linked through `relationship` to any of `ids`.
    pub async fn find_by_related(
        &self,
        ctx: &RequestContext,
        relationship: &str,
        ids: &[String],
        params: &FindParams,
        cursor: &Cursor,
    ) -> Result<Page<M::Entity>> {
        let statement = self
            .compiler()
            .find_by_related(ctx, relationship, ids, params)?;
        self.page(&statement, cursor).await
    }

    /// The `k` entities nearest to `vector`, best first.
    pub async fn find_similar(
        &self,
        ctx: &RequestContext,
        vector: &[f64],
        k: usize,
    ) -> Result<Vec<M::Entity>> {
        let statement = self.compiler().find_similar(ctx, vector, k)?;
        let rows = self.client.read(&statement.render()).await?;
        self.map_rows(&rows)
    }

    /// The entity with `id`.
    ///
    /// A scoped miss is reported as [`GraphError::AccessDenied`] when the id
    /// exists under another tenant, else [`GraphError::NotFound`].
    pub async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> Result<M::Entity> {
        let statement = self.compiler().find_by_id(ctx, id)?;
        let rows = self.client.read(&statement.render()).await?;
        match rows.first() {
            Some(row) => self.mapper.map(&self.descriptor, row),
            None => Err(self.miss(ctx, id).await),
        }
    }

    /// Creates the entity and returns it as stored.
    pub async fn create(&self, ctx: &RequestContext, input: &WriteInput) -> Result<M::Entity> {
        self.write(ctx, input, WriteMode::Create).await
    }

    /// Replaces the entity and returns it as stored.
    pub async fn put(&self, ctx: &RequestContext, input: &WriteInput) -> Result<M::Entity> {
        self.write(ctx, input, WriteMode::Put).await
    }

    /// Partially updates the entity and returns it as stored.
    pub async fn patch(&self, ctx: &RequestContext, input: &WriteInput) -> Result<M::Entity> {
        self.write(ctx, input, WriteMode::Patch).await
    }

    /// Deletes the entity and its relationships.
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let statement = self.compiler().delete(ctx, id)?;
        let rows = self.client.write(&statement.render()).await?;
        if rows.is_empty() {
            return Err(self.miss(ctx, id).await);
        }
        info!(entity = self.descriptor.label(), "repository.delete.ok");
        Ok(())
    }

    async fn write(
        &self,
        ctx: &RequestContext,
        input: &WriteInput,
        mode: WriteMode,
    ) -> Result<M::Entity> {
        let statements = self.compiler().write(ctx, input, mode)?;
        if let Some(precheck) = &statements.precheck {
            let rows = self.client.read(&precheck.render()).await?;
            let missing = missing_from_rows(&rows)?;
            if !missing.is_empty() {
                debug!(
                    entity = self.descriptor.label(),
                    missing = missing.len(),
                    "repository.write.rejected"
                );
                return Err(GraphError::ReferentialIntegrity { missing });
            }
        }
        let rows = self.client.write(&statements.write.render()).await?;
        if rows.is_empty() {
            return Err(match mode {
                // A scoped create only comes back empty when the tenant node is missing.
                WriteMode::Create => GraphError::NotFound {
                    entity: self.settings.tenant_label.clone(),
                    id: ctx.company_id.clone().unwrap_or_default(),
                },
                WriteMode::Put | WriteMode::Patch => self.miss(ctx, &statements.id).await,
            });
        }
        debug!(entity = self.descriptor.label(), ?mode, "repository.write.ok");
        self.find_by_id(ctx, &statements.id).await
    }

    async fn page(&self, statement: &Statement, cursor: &Cursor) -> Result<Page<M::Entity>> {
        let rows = self.client.read_page(statement, cursor).await?;
        let items = self.map_rows(&rows.rows)?;
        Ok(Page::new(items, rows.total, cursor.clone()))
    }

    fn map_rows(&self, rows: &[Row]) -> Result<Vec<M::Entity>> {
        rows.iter()
            .map(|row| self.mapper.map(&self.descriptor, row))
            .collect()
    }

    /// Classifies a miss on `id`. Unscoped and elevated lookups cannot be
    /// forbidden, so they skip the existence query.
    async fn miss(&self, ctx: &RequestContext, id: &str) -> GraphError {
        let entity = self.descriptor.label().to_owned();
        let not_found = GraphError::NotFound {
            entity: entity.clone(),
            id: id.to_owned(),
        };
        if !self.descriptor.is_company_scoped || ctx.elevated {
            return not_found;
        }
        let exists = match self.compiler().exists_unscoped(id) {
            Ok(statement) => self.client.read(&statement.render()).await,
            Err(err) => return err,
        };
        match exists {
            Ok(rows) => {
                let found = rows
                    .first()
                    .and_then(|row| row.get("exists"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if found {
                    info!(entity = %entity, "repository.find_by_id.forbidden");
                    GraphError::AccessDenied {
                        entity,
                        id: id.to_owned(),
                    }
                } else {
                    not_found
                }
            }
            Err(err) => err,
        }
    }
}
