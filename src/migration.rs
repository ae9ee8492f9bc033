//! Table evolution. The only strategy is a destructive rebuild: drop the old table, replace
//! metadata, create the new table. Rows are not carried over.

use crate::config::{ColumnSpec, EntityDefinition};
use crate::error::{AppError, EvolveStep};
use crate::service::existence::physical_table_exists;
use crate::service::resolver::{fallbacks, resolve_columns, ColumnFallback};
use crate::service::UnitOfWork;
use crate::sql::{build_create, build_drop};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct EvolveOutcome {
    pub success: bool,
    pub entity: EntityDefinition,
    /// Whether a physical table under the previous name was dropped.
    pub dropped: bool,
    pub statement: String,
    pub fallbacks: Vec<ColumnFallback>,
}

/// Brings an entity's physical table in line with new metadata. Callers hold the entity and
/// name locks for the duration.
#[async_trait]
pub trait EvolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evolve(
        &self,
        uow: &UnitOfWork<'_>,
        entity_id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<EvolveOutcome, AppError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RebuildStrategy;

/// Failure after a destructive step leaves metadata and the physical table out of step; nothing
/// is rolled back.
fn after(entity_id: i32, completed: &[EvolveStep], failed: EvolveStep, err: AppError) -> AppError {
    if completed.is_empty() {
        return err;
    }
    tracing::error!(
        entity_id,
        completed = ?completed,
        failed = %failed,
        error = %err,
        "rebuild left entity inconsistent"
    );
    AppError::InconsistentState {
        entity_id,
        completed: completed.to_vec(),
        failed,
        source: Box::new(err),
    }
}

#[async_trait]
impl EvolutionStrategy for RebuildStrategy {
    fn name(&self) -> &'static str {
        "rebuild"
    }

    async fn evolve(
        &self,
        uow: &UnitOfWork<'_>,
        entity_id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<EvolveOutcome, AppError> {
        let current = uow
            .run(uow.store().get_entity(entity_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
        if uow.settings().strict_lookups {
            // Unresolvable lookups must fail before the drop.
            resolve_columns(uow, columns).await?;
        }
        let mut completed = Vec::new();

        let dropped = physical_table_exists(uow, &current.name).await?;
        if dropped {
            let sql = build_drop(&current.name);
            uow.run(uow.executor().execute(&sql))
                .await
                .map_err(|e| e.into_ddl(&current.name))?;
            completed.push(EvolveStep::DropTable);
            tracing::info!(table = %current.name, "dropped table for rebuild");
        }

        let entity = async {
            uow.checkpoint()?;
            uow.run(uow.store().replace_entity(entity_id, new_name, columns)).await
        }
        .await
        .map_err(|e| after(entity_id, &completed, EvolveStep::ReplaceMetadata, e))?;
        completed.push(EvolveStep::ReplaceMetadata);

        let (statement, mapped) = async {
            uow.checkpoint()?;
            let mapped = resolve_columns(uow, columns).await?;
            let sql = build_create(new_name, &mapped);
            uow.run(uow.executor().execute(&sql))
                .await
                .map_err(|e| e.into_ddl(new_name))?;
            Ok::<_, AppError>((sql, mapped))
        }
        .await
        .map_err(|e| after(entity_id, &completed, EvolveStep::CreateTable, e))?;

        tracing::info!(
            entity_id,
            from = %current.name,
            to = %new_name,
            columns = columns.len(),
            "table rebuilt"
        );
        Ok(EvolveOutcome {
            success: true,
            entity,
            dropped,
            statement,
            fallbacks: fallbacks(&mapped),
        })
    }
}
