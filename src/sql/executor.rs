//! SQL execution sink for generated statements. Postgres implementation over a sqlx pool.

use crate::error::AppError;
use crate::sql::{row_from_pg, Row};
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a literal DDL statement.
    async fn execute(&self, sql: &str) -> Result<(), AppError>;

    /// Run a bounded `SELECT`; true when it returned at least one row.
    async fn row_exists(&self, sql: &str) -> Result<bool, AppError>;

    /// Base tables in the target schema.
    async fn list_tables(&self) -> Result<Vec<String>, AppError>;

    /// `(column_name, data_type)` in ordinal order for one table in the target schema.
    async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, AppError>;

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

pub struct PgSqlExecutor {
    pool: PgPool,
    target_schema: String,
}

impl PgSqlExecutor {
    /// `target_schema` scopes catalog lookups; the pool's search_path decides where DDL lands.
    pub fn new(pool: PgPool, target_schema: impl Into<String>) -> Self {
        PgSqlExecutor {
            pool,
            target_schema: target_schema.into(),
        }
    }
}

#[async_trait]
impl SqlExecutor for PgSqlExecutor {
    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "execute");
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn row_exists(&self, sql: &str) -> Result<bool, AppError> {
        tracing::debug!(sql = %sql, "row_exists");
        let row = sqlx::query(sql).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let sql = "SELECT table_name::text FROM information_schema.tables \
                   WHERE table_type = 'BASE TABLE' AND table_schema = $1 \
                   ORDER BY table_name";
        tracing::debug!(sql = %sql, schema = %self.target_schema, "query");
        let names = sqlx::query_scalar::<_, String>(sql)
            .bind(&self.target_schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, AppError> {
        let sql = "SELECT column_name::text, data_type::text FROM information_schema.columns \
                   WHERE table_schema = $1 AND table_name = $2 \
                   ORDER BY ordinal_position";
        tracing::debug!(sql = %sql, table = %table, "query");
        let rows = sqlx::query_as::<_, (String, String)>(sql)
            .bind(&self.target_schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %sql, "query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_from_pg).collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}
