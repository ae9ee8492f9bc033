//! Entity and column metadata persistence. The `_sys_*` tables live in the schema named by
//! `DYNTABLE_SCHEMA` (default `dyntable`); column attributes are kept as a JSONB payload.

use crate::config::{ColumnDefinition, ColumnSpec, EngineSettings, EntityDefinition, EntitySummary};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;

pub const ENTITIES_TABLE: &str = "_sys_entities";
pub const COLUMNS_TABLE: &str = "_sys_entity_columns";

/// Durable record of entities and their columns.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Case-insensitive lookup, columns included.
    async fn find_entity_by_name(&self, name: &str) -> Result<Option<EntityDefinition>, AppError>;

    async fn get_entity(&self, id: i32) -> Result<Option<EntityDefinition>, AppError>;

    /// All entities ordered by name.
    async fn list_entities(&self) -> Result<Vec<EntitySummary>, AppError>;

    /// Insert an entity and its columns as one unit. `Conflict` when the name is taken in any case.
    async fn create_entity(&self, name: &str, columns: &[ColumnSpec]) -> Result<EntityDefinition, AppError>;

    /// Rename the entity and replace its columns as one unit. Columns whose name matches an
    /// existing one (ignoring case) are updated in place and keep their id and `created_at`;
    /// the rest of the old columns are deleted and the rest of the new ones inserted.
    async fn replace_entity(
        &self,
        id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<EntityDefinition, AppError>;

    /// Delete the entity and its columns. Missing ids are not an error.
    async fn delete_entity(&self, id: i32) -> Result<(), AppError>;

    async fn get_column(&self, id: i32) -> Result<Option<ColumnDefinition>, AppError>;
}

/// Create the metadata schema and `_sys_*` tables if absent.
pub async fn ensure_sys_tables(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let entities = format!("{}.{}", schema, ENTITIES_TABLE);
    let entities_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        entities
    );
    sqlx::query(&entities_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {}_lower_name ON {} (lower(name))",
        ENTITIES_TABLE, entities
    ))
    .execute(pool)
    .await?;

    let columns = format!("{}.{}", schema, COLUMNS_TABLE);
    let columns_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
            entity_id INTEGER NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        columns, entities
    );
    sqlx::query(&columns_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {}_entity_lower_name ON {} (entity_id, lower(name))",
        COLUMNS_TABLE, columns
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(AppError::Db)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

/// Pool whose sessions resolve unqualified names against the target schema, so generated
/// tables land there.
pub async fn connect(database_url: &str, settings: &EngineSettings) -> Result<PgPool, AppError> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?
        .options([("search_path", settings.target_schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(settings.op_timeout)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

type EntityRow = (i32, String, DateTime<Utc>, DateTime<Utc>);
type ColumnRow = (i32, i32, i32, String, serde_json::Value, DateTime<Utc>, DateTime<Utc>);

const COLUMN_FIELDS: &str = "id, entity_id, position, name, payload, created_at, updated_at";

pub struct PgMetadataStore {
    pool: PgPool,
    schema: String,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgMetadataStore {
            pool,
            schema: schema.into(),
        }
    }

    fn entities(&self) -> String {
        format!("{}.{}", self.schema, ENTITIES_TABLE)
    }

    fn columns(&self) -> String {
        format!("{}.{}", self.schema, COLUMNS_TABLE)
    }

    async fn load(&self, row: EntityRow) -> Result<EntityDefinition, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE entity_id = $1 ORDER BY position, id",
            COLUMN_FIELDS,
            self.columns()
        );
        let rows: Vec<ColumnRow> = sqlx::query_as(&sql).bind(row.0).fetch_all(&self.pool).await?;
        let columns = rows.into_iter().map(column_from_row).collect::<Result<Vec<_>, _>>()?;
        let (id, name, created_at, updated_at) = row;
        Ok(EntityDefinition {
            id,
            name,
            columns,
            created_at,
            updated_at,
        })
    }
}

fn column_from_row(row: ColumnRow) -> Result<ColumnDefinition, AppError> {
    let (id, entity_id, position, name, payload, created_at, updated_at) = row;
    let mut spec: ColumnSpec = serde_json::from_value(payload)
        .map_err(|e| AppError::Persistence(format!("column {} payload: {}", id, e)))?;
    spec.name = name;
    Ok(ColumnDefinition {
        id,
        entity_id,
        position,
        spec,
        created_at,
        updated_at,
    })
}

fn payload(spec: &ColumnSpec) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(spec).map_err(|e| AppError::Persistence(format!("column '{}': {}", spec.name, e)))
}

/// Unique index violations become `Conflict`; everything else stays a database error.
fn map_unique(name: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("entity '{}' already exists", name))
        }
        _ => AppError::Db(e),
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn find_entity_by_name(&self, name: &str) -> Result<Option<EntityDefinition>, AppError> {
        let sql = format!(
            "SELECT id, name, created_at, updated_at FROM {} WHERE lower(name) = lower($1)",
            self.entities()
        );
        let row: Option<EntityRow> = sqlx::query_as(&sql).bind(name).fetch_optional(&self.pool).await?;
        match row {
            Some(r) => Ok(Some(self.load(r).await?)),
            None => Ok(None),
        }
    }

    async fn get_entity(&self, id: i32) -> Result<Option<EntityDefinition>, AppError> {
        let sql = format!(
            "SELECT id, name, created_at, updated_at FROM {} WHERE id = $1",
            self.entities()
        );
        let row: Option<EntityRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(r) => Ok(Some(self.load(r).await?)),
            None => Ok(None),
        }
    }

    async fn list_entities(&self) -> Result<Vec<EntitySummary>, AppError> {
        let sql = format!("SELECT id, name FROM {} ORDER BY name", self.entities());
        let rows: Vec<(i32, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, name)| EntitySummary { id, name }).collect())
    }

    async fn create_entity(&self, name: &str, columns: &[ColumnSpec]) -> Result<EntityDefinition, AppError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO {} (name, created_at, updated_at) VALUES ($1, NOW(), NOW()) \
             RETURNING id, name, created_at, updated_at",
            self.entities()
        );
        let (id, stored_name, created_at, updated_at): EntityRow = sqlx::query_as(&sql)
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique(name))?;

        let insert = format!(
            "INSERT INTO {} (entity_id, position, name, payload, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {}",
            self.columns(),
            COLUMN_FIELDS
        );
        let mut stored = Vec::with_capacity(columns.len());
        for (pos, spec) in columns.iter().enumerate() {
            let row: ColumnRow = sqlx::query_as(&insert)
                .bind(id)
                .bind(pos as i32)
                .bind(&spec.name)
                .bind(payload(spec)?)
                .fetch_one(&mut *tx)
                .await?;
            stored.push(column_from_row(row)?);
        }
        tx.commit().await?;
        Ok(EntityDefinition {
            id,
            name: stored_name,
            columns: stored,
            created_at,
            updated_at,
        })
    }

    async fn replace_entity(
        &self,
        id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<EntityDefinition, AppError> {
        let mut tx = self.pool.begin().await?;
        let rename = format!(
            "UPDATE {} SET name = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING id, name, created_at, updated_at",
            self.entities()
        );
        let entity: Option<EntityRow> = sqlx::query_as(&rename)
            .bind(id)
            .bind(new_name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_unique(new_name))?;
        let (id, stored_name, created_at, updated_at) =
            entity.ok_or_else(|| AppError::NotFound(format!("entity {}", id)))?;

        let existing: Vec<(i32, String)> = sqlx::query_as(&format!(
            "SELECT id, name FROM {} WHERE entity_id = $1",
            self.columns()
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let by_name: HashMap<String, i32> = existing
            .into_iter()
            .map(|(cid, name)| (name.to_lowercase(), cid))
            .collect();
        let wanted: Vec<Option<i32>> = columns
            .iter()
            .map(|c| by_name.get(&c.name.to_lowercase()).copied())
            .collect();

        let keep: Vec<i32> = wanted.iter().flatten().copied().collect();
        sqlx::query(&format!(
            "DELETE FROM {} WHERE entity_id = $1 AND NOT (id = ANY($2))",
            self.columns()
        ))
        .bind(id)
        .bind(&keep)
        .execute(&mut *tx)
        .await?;

        let update = format!(
            "UPDATE {} SET position = $2, name = $3, payload = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            self.columns(),
            COLUMN_FIELDS
        );
        let insert = format!(
            "INSERT INTO {} (entity_id, position, name, payload, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {}",
            self.columns(),
            COLUMN_FIELDS
        );
        let mut stored = Vec::with_capacity(columns.len());
        for (pos, (spec, matched)) in columns.iter().zip(wanted).enumerate() {
            let row: ColumnRow = match matched {
                Some(cid) => sqlx::query_as::<_, ColumnRow>(&update).bind(cid),
                None => sqlx::query_as::<_, ColumnRow>(&insert).bind(id),
            }
            .bind(pos as i32)
            .bind(&spec.name)
            .bind(payload(spec)?)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(column_from_row(row)?);
        }
        tx.commit().await?;
        Ok(EntityDefinition {
            id,
            name: stored_name,
            columns: stored,
            created_at,
            updated_at,
        })
    }

    async fn delete_entity(&self, id: i32) -> Result<(), AppError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.entities()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_column(&self, id: i32) -> Result<Option<ColumnDefinition>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMN_FIELDS, self.columns());
        let row: Option<ColumnRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(column_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_points_at_postgres_database() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/app?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "app");
    }

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
