//! SchemaEngine: the public operations. Each call builds its own unit of work from the shared
//! store, executor and settings plus the caller's cancellation token.

use crate::config::{
    validate_columns, validate_definition, validate_identifier, ColumnSpec, EngineSettings, EntityData,
    EntityDefinition, EntitySummary, TableDefinition,
};
use crate::error::AppError;
use crate::migration::{EvolutionStrategy, EvolveOutcome, RebuildStrategy};
use crate::service::existence::{entity_exists, has_rows_batch};
use crate::service::locks::{entity_key, name_key, LockRegistry};
use crate::service::resolver::{fallbacks, resolve_columns, ColumnFallback};
use crate::service::UnitOfWork;
use crate::sql::{build_create, build_select_rows, Row, SqlExecutor};
use crate::store::{MetadataStore, COLUMNS_TABLE, ENTITIES_TABLE};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Serialize)]
pub struct CreateTableOutcome {
    pub created: bool,
    pub message: String,
    pub entity_id: i32,
    pub statement: String,
    pub fallbacks: Vec<ColumnFallback>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LookupRows {
    pub table: String,
    pub rows: Vec<Row>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

pub struct SchemaEngine {
    store: Arc<dyn MetadataStore>,
    executor: Arc<dyn SqlExecutor>,
    settings: EngineSettings,
    locks: LockRegistry,
    strategy: Arc<dyn EvolutionStrategy>,
}

impl SchemaEngine {
    pub fn new(store: Arc<dyn MetadataStore>, executor: Arc<dyn SqlExecutor>, settings: EngineSettings) -> Self {
        SchemaEngine {
            store,
            executor,
            settings,
            locks: LockRegistry::new(),
            strategy: Arc::new(RebuildStrategy),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn EvolutionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn unit<'a>(&'a self, cancel: &'a CancellationToken) -> UnitOfWork<'a> {
        UnitOfWork::new(self.store.as_ref(), self.executor.as_ref(), &self.settings, cancel)
    }

    /// Persist a new entity and create its table. Fails with `Validation` when an entity with the
    /// same name exists in any case. If the CREATE statement fails the metadata is removed again.
    pub async fn create_table(
        &self,
        def: &TableDefinition,
        cancel: &CancellationToken,
    ) -> Result<CreateTableOutcome, AppError> {
        validate_definition(def, self.settings.identifier_policy)?;
        let uow = self.unit(cancel);
        let _locks = uow
            .run(async { Ok(self.locks.acquire(vec![name_key(&def.name)]).await) })
            .await?;

        if entity_exists(&uow, &def.name).await? {
            return Err(AppError::Validation(format!("table '{}' already exists", def.name)));
        }
        let mapped = resolve_columns(&uow, &def.columns).await?;
        let statement = build_create(&def.name, &mapped);
        let entity = uow.run(self.store.create_entity(&def.name, &def.columns)).await?;

        if let Err(e) = uow.run(self.executor.execute(&statement)).await {
            let err = e.into_ddl(&def.name);
            // Compensation runs even after cancellation.
            let cleanup = tokio::time::timeout(self.settings.op_timeout, self.store.delete_entity(entity.id)).await;
            if !matches!(cleanup, Ok(Ok(()))) {
                tracing::error!(entity_id = entity.id, table = %def.name, "failed to remove metadata after create error");
            }
            return Err(err);
        }

        tracing::info!(entity_id = entity.id, table = %def.name, columns = def.columns.len(), "table created");
        Ok(CreateTableOutcome {
            created: true,
            message: format!("Table '{}' created successfully.", def.name),
            entity_id: entity.id,
            statement,
            fallbacks: fallbacks(&mapped),
        })
    }

    /// Rename the entity, replace its columns and rebuild its table through the configured strategy.
    pub async fn update_columns(
        &self,
        entity_id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
        cancel: &CancellationToken,
    ) -> Result<EvolveOutcome, AppError> {
        let policy = self.settings.identifier_policy;
        validate_identifier("table", new_name, policy)?;
        validate_columns(columns, policy)?;

        let uow = self.unit(cancel);
        let _entity_lock = uow
            .run(async { Ok(self.locks.acquire(vec![entity_key(entity_id)]).await) })
            .await?;
        let current = uow
            .run(self.store.get_entity(entity_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
        let _name_locks = uow
            .run(async { Ok(self.locks.acquire(vec![name_key(&current.name), name_key(new_name)]).await) })
            .await?;

        if self.settings.rename_collision_check && current.name.to_lowercase() != new_name.to_lowercase() {
            if let Some(other) = uow.run(self.store.find_entity_by_name(new_name)).await? {
                if other.id != entity_id {
                    return Err(AppError::Validation(format!(
                        "cannot rename entity {} to '{}': name is used by entity {}",
                        entity_id, new_name, other.id
                    )));
                }
            }
        }

        tracing::debug!(entity_id, strategy = self.strategy.name(), "evolving entity");
        self.strategy.evolve(&uow, entity_id, new_name, columns).await
    }

    /// Metadata-level, case-insensitive.
    pub async fn table_exists(&self, name: &str, cancel: &CancellationToken) -> Result<bool, AppError> {
        entity_exists(&self.unit(cancel), name).await
    }

    pub async fn tables_have_values(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, bool>, AppError> {
        has_rows_batch(&self.unit(cancel), names).await
    }

    pub async fn get_entity_info(&self, name: &str, cancel: &CancellationToken) -> Result<EntityDefinition, AppError> {
        let uow = self.unit(cancel);
        uow.run(self.store.find_entity_by_name(name))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity '{}'", name)))
    }

    /// 0 when no entity has this name.
    pub async fn get_entity_id_by_name(&self, name: &str, cancel: &CancellationToken) -> Result<i32, AppError> {
        let uow = self.unit(cancel);
        Ok(uow
            .run(self.store.find_entity_by_name(name))
            .await?
            .map(|e| e.id)
            .unwrap_or(0))
    }

    /// Names behind a lookup triple. Both columns must belong to the entity.
    pub async fn get_entity_data(
        &self,
        entity_id: i32,
        key_column_id: i32,
        value_column_id: i32,
        cancel: &CancellationToken,
    ) -> Result<EntityData, AppError> {
        let uow = self.unit(cancel);
        let entity = uow
            .run(self.store.get_entity(entity_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
        let column_name = |id: i32| {
            entity
                .column_by_id(id)
                .map(|c| c.spec.name.clone())
                .ok_or_else(|| AppError::NotFound(format!("column {} on entity '{}'", id, entity.name)))
        };
        Ok(EntityData {
            key_column_name: column_name(key_column_id)?,
            value_column_name: column_name(value_column_id)?,
            entity_name: entity.name.clone(),
        })
    }

    pub async fn list_entities(&self, cancel: &CancellationToken) -> Result<Vec<EntitySummary>, AppError> {
        let uow = self.unit(cancel);
        uow.run(self.store.list_entities()).await
    }

    /// Up to `row_limit` rows of the entity's table.
    pub async fn lookup_rows(&self, entity_id: i32, cancel: &CancellationToken) -> Result<LookupRows, AppError> {
        let uow = self.unit(cancel);
        let entity = uow
            .run(self.store.get_entity(entity_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
        let sql = build_select_rows(&entity.name, self.settings.row_limit);
        let rows = uow
            .run(self.executor.fetch_rows(&sql))
            .await
            .map_err(|e| e.into_ddl(&entity.name))?;
        Ok(LookupRows {
            table: entity.name,
            rows,
        })
    }

    /// Base tables in the target schema, metadata tables excluded.
    pub async fn list_physical_tables(&self, cancel: &CancellationToken) -> Result<Vec<String>, AppError> {
        let uow = self.unit(cancel);
        let tables = uow.run(self.executor.list_tables()).await?;
        Ok(tables
            .into_iter()
            .filter(|t| t != ENTITIES_TABLE && t != COLUMNS_TABLE)
            .collect())
    }

    pub async fn table_details(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<ColumnInfo>>, AppError> {
        let uow = self.unit(cancel);
        let mut out = BTreeMap::new();
        for table in self.list_physical_tables(cancel).await? {
            let cols = uow.run(self.executor.table_columns(&table)).await?;
            let cols = cols
                .into_iter()
                .map(|(name, data_type)| ColumnInfo { name, data_type })
                .collect();
            out.insert(table, cols);
        }
        Ok(out)
    }

    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        let uow = self.unit(cancel);
        uow.run(self.executor.ping()).await
    }
}
