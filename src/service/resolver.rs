//! Column resolution: looks up lookup targets in metadata, then maps every column.

use crate::config::{ColumnSpec, EntityDefinition, LogicalType};
use crate::error::AppError;
use crate::service::UnitOfWork;
use crate::sql::{map_column, LookupTarget, MappedColumn, TypeResolution};
use serde::Serialize;
use std::collections::HashMap;

/// A lookup column that was emitted as plain `varchar` instead of a reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnFallback {
    pub column: String,
    pub reason: String,
}

pub fn fallbacks(mapped: &[MappedColumn]) -> Vec<ColumnFallback> {
    mapped
        .iter()
        .filter_map(|m| match &m.resolution {
            TypeResolution::FallbackApplied { reason } => Some(ColumnFallback {
                column: m.name.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Map `columns` in order. Lookup targets are read from the store at call time; a target that
/// cannot be found downgrades that column to a fallback and logs a warning, or fails the whole
/// call with `ReferenceResolution` when strict lookups are on.
pub async fn resolve_columns(uow: &UnitOfWork<'_>, columns: &[ColumnSpec]) -> Result<Vec<MappedColumn>, AppError> {
    let mut targets: HashMap<i32, Option<EntityDefinition>> = HashMap::new();
    let mut mapped = Vec::with_capacity(columns.len());
    for column in columns {
        if column.logical_type != LogicalType::Lookup {
            mapped.push(map_column(column, None));
            continue;
        }
        let (entity_id, key_id) = match (column.lookup_entity_id, column.lookup_key_column_id) {
            (Some(e), Some(k)) => (e, k),
            _ => {
                let m = map_column(column, Some(LookupTarget::Missing("lookup target entity or key column not set")));
                mapped.push(check_fallback(uow, m)?);
                continue;
            }
        };
        if !targets.contains_key(&entity_id) {
            let found = uow.run(uow.store().get_entity(entity_id)).await?;
            targets.insert(entity_id, found);
        }
        let m = match targets.get(&entity_id).and_then(Option::as_ref) {
            None => map_column(
                column,
                Some(LookupTarget::Missing(&format!("entity {} not found", entity_id))),
            ),
            Some(entity) => match entity.column_by_id(key_id) {
                Some(key) => map_column(
                    column,
                    Some(LookupTarget::Found {
                        table: &entity.name,
                        key_column: &key.spec,
                    }),
                ),
                None => map_column(
                    column,
                    Some(LookupTarget::Missing(&format!(
                        "column {} not found on entity '{}'",
                        key_id, entity.name
                    ))),
                ),
            },
        };
        mapped.push(check_fallback(uow, m)?);
    }
    Ok(mapped)
}

fn check_fallback(uow: &UnitOfWork<'_>, m: MappedColumn) -> Result<MappedColumn, AppError> {
    if let TypeResolution::FallbackApplied { reason } = &m.resolution {
        if uow.settings().strict_lookups {
            return Err(AppError::ReferenceResolution {
                column: m.name.clone(),
                reason: reason.clone(),
            });
        }
        tracing::warn!(column = %m.name, reason = %reason, "lookup fallback to varchar");
    }
    Ok(m)
}
