//! Existence and row-presence checks. Read-only; no locks taken.

use crate::error::AppError;
use crate::service::UnitOfWork;
use crate::sql::build_row_check;
use std::collections::HashMap;

/// Metadata-level, case-insensitive.
pub async fn entity_exists(uow: &UnitOfWork<'_>, name: &str) -> Result<bool, AppError> {
    Ok(uow.run(uow.store().find_entity_by_name(name)).await?.is_some())
}

/// Catalog-level, exact name.
pub async fn physical_table_exists(uow: &UnitOfWork<'_>, name: &str) -> Result<bool, AppError> {
    let tables = uow.run(uow.executor().list_tables()).await?;
    Ok(tables.iter().any(|t| t == name))
}

/// False when no entity has this name; otherwise checks the entity's table for one row.
pub async fn has_rows(uow: &UnitOfWork<'_>, name: &str) -> Result<bool, AppError> {
    let entity = match uow.run(uow.store().find_entity_by_name(name)).await? {
        Some(e) => e,
        None => return Ok(false),
    };
    let sql = build_row_check(&entity.name);
    uow.run(uow.executor().row_exists(&sql)).await
}

/// One entry per distinct input name. A failed check reports `false` for that name; only
/// cancellation stops the batch.
pub async fn has_rows_batch(uow: &UnitOfWork<'_>, names: &[String]) -> Result<HashMap<String, bool>, AppError> {
    let mut out = HashMap::with_capacity(names.len());
    for name in names {
        uow.checkpoint()?;
        let v = match has_rows(uow, name).await {
            Ok(v) => v,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                tracing::warn!(table = %name, error = %e, "row check failed");
                false
            }
        };
        out.insert(name.clone(), v);
    }
    Ok(out)
}
