//! In-process metadata store and SQL sink for tests and embedding without a database.
//! The executor understands only the statements this crate generates.

use crate::config::{ColumnDefinition, ColumnSpec, EntityDefinition, EntitySummary};
use crate::error::AppError;
use crate::sql::{Row, SqlExecutor};
use crate::store::MetadataStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    m.lock()
        .map_err(|_| AppError::Persistence("in-memory state lock poisoned".into()))
}

#[derive(Default)]
struct MetadataState {
    last_entity_id: i32,
    last_column_id: i32,
    entities: BTreeMap<i32, EntityDefinition>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    state: Mutex<MetadataState>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_taken(state: &MetadataState, name: &str, except: Option<i32>) -> bool {
    let folded = name.to_lowercase();
    state
        .entities
        .values()
        .any(|e| Some(e.id) != except && e.name.to_lowercase() == folded)
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn find_entity_by_name(&self, name: &str) -> Result<Option<EntityDefinition>, AppError> {
        let folded = name.to_lowercase();
        let state = lock(&self.state)?;
        Ok(state
            .entities
            .values()
            .find(|e| e.name.to_lowercase() == folded)
            .cloned())
    }

    async fn get_entity(&self, id: i32) -> Result<Option<EntityDefinition>, AppError> {
        Ok(lock(&self.state)?.entities.get(&id).cloned())
    }

    async fn list_entities(&self) -> Result<Vec<EntitySummary>, AppError> {
        let state = lock(&self.state)?;
        let mut list: Vec<EntitySummary> = state
            .entities
            .values()
            .map(|e| EntitySummary {
                id: e.id,
                name: e.name.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn create_entity(&self, name: &str, columns: &[ColumnSpec]) -> Result<EntityDefinition, AppError> {
        let mut state = lock(&self.state)?;
        if name_taken(&state, name, None) {
            return Err(AppError::Conflict(format!("entity '{}' already exists", name)));
        }
        state.last_entity_id += 1;
        let id = state.last_entity_id;
        let now = Utc::now();
        let mut stored = Vec::with_capacity(columns.len());
        for (pos, spec) in columns.iter().enumerate() {
            state.last_column_id += 1;
            stored.push(ColumnDefinition {
                id: state.last_column_id,
                entity_id: id,
                position: pos as i32,
                spec: spec.clone(),
                created_at: now,
                updated_at: now,
            });
        }
        let entity = EntityDefinition {
            id,
            name: name.to_string(),
            columns: stored,
            created_at: now,
            updated_at: now,
        };
        state.entities.insert(id, entity.clone());
        Ok(entity)
    }

    async fn replace_entity(
        &self,
        id: i32,
        new_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<EntityDefinition, AppError> {
        let mut state = lock(&self.state)?;
        if name_taken(&state, new_name, Some(id)) {
            return Err(AppError::Conflict(format!("entity '{}' already exists", new_name)));
        }
        let previous: HashMap<String, ColumnDefinition> = match state.entities.get(&id) {
            Some(e) => e
                .columns
                .iter()
                .map(|c| (c.spec.name.to_lowercase(), c.clone()))
                .collect(),
            None => return Err(AppError::NotFound(format!("entity {}", id))),
        };
        let now = Utc::now();
        let mut stored = Vec::with_capacity(columns.len());
        for (pos, spec) in columns.iter().enumerate() {
            let column = match previous.get(&spec.name.to_lowercase()) {
                Some(old) => ColumnDefinition {
                    position: pos as i32,
                    spec: spec.clone(),
                    updated_at: now,
                    ..old.clone()
                },
                None => {
                    state.last_column_id += 1;
                    ColumnDefinition {
                        id: state.last_column_id,
                        entity_id: id,
                        position: pos as i32,
                        spec: spec.clone(),
                        created_at: now,
                        updated_at: now,
                    }
                }
            };
            stored.push(column);
        }
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("entity {}", id)))?;
        entity.name = new_name.to_string();
        entity.columns = stored;
        entity.updated_at = now;
        Ok(entity.clone())
    }

    async fn delete_entity(&self, id: i32) -> Result<(), AppError> {
        lock(&self.state)?.entities.remove(&id);
        Ok(())
    }

    async fn get_column(&self, id: i32) -> Result<Option<ColumnDefinition>, AppError> {
        let state = lock(&self.state)?;
        Ok(state
            .entities
            .values()
            .flat_map(|e| e.columns.iter())
            .find(|c| c.id == id)
            .cloned())
    }
}

struct MemoryTable {
    columns: Vec<(String, String)>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct ExecutorState {
    tables: BTreeMap<String, MemoryTable>,
    statements: Vec<String>,
    fail_on: Vec<String>,
    latency: Option<Duration>,
}

/// Records every statement it is given and keeps table shapes and rows in memory.
#[derive(Default)]
pub struct MemorySqlExecutor {
    state: Mutex<ExecutorState>,
}

impl MemorySqlExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement passed to `execute`, `row_exists` or `fetch_rows`, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().map(|s| s.statements.clone()).unwrap_or_default()
    }

    /// Make any later statement starting with `prefix` fail.
    pub fn fail_on(&self, prefix: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.fail_on.push(prefix.to_string());
        }
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut s) = self.state.lock() {
            s.latency = Some(latency);
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert_row(&self, table: &str, row: Row) -> Result<(), AppError> {
        let mut state = lock(&self.state)?;
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| AppError::ddl(table, "relation does not exist"))?;
        t.rows.push(row);
        Ok(())
    }

    async fn enter(&self, sql: &str) -> Result<(), AppError> {
        let latency = {
            let mut state = lock(&self.state)?;
            state.statements.push(sql.to_string());
            if state.fail_on.iter().any(|p| sql.starts_with(p.as_str())) {
                return Err(AppError::ddl(
                    quoted_name(sql).unwrap_or_default(),
                    "injected failure",
                ));
            }
            state.latency
        };
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        Ok(())
    }
}

/// First double-quoted name in a statement.
fn quoted_name(sql: &str) -> Option<&str> {
    let start = sql.find('"')? + 1;
    let len = sql.get(start..)?.find('"')?;
    sql.get(start..start + len)
}

/// `(column, type)` pairs from the body of a generated CREATE TABLE.
fn parse_columns(sql: &str) -> Vec<(String, String)> {
    let body = match (sql.find('('), sql.rfind(')')) {
        (Some(open), Some(close)) if close > open => &sql[open + 1..close],
        _ => return Vec::new(),
    };
    split_definitions(body)
        .into_iter()
        .filter_map(|def| {
            let def = def.trim().strip_prefix('"')?;
            let end = def.find('"')?;
            let name = def.get(..end)?.to_string();
            let ty = def.get(end + 1..)?.split_whitespace().next()?.to_string();
            Some((name, ty))
        })
        .collect()
}

/// Split on commas outside quoted identifiers, string literals and parentheses.
fn split_definitions(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut in_ident, mut in_literal, mut depth, mut start) = (false, false, 0usize, 0);
    for (i, ch) in body.char_indices() {
        match ch {
            '"' if !in_literal => in_ident = !in_ident,
            '\'' if !in_ident => in_literal = !in_literal,
            '(' if !in_ident && !in_literal => depth += 1,
            ')' if !in_ident && !in_literal => depth = depth.saturating_sub(1),
            ',' if !in_ident && !in_literal && depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn limit_of(sql: &str) -> usize {
    sql.rsplit_once("LIMIT ")
        .and_then(|(_, n)| n.trim().parse().ok())
        .unwrap_or(usize::MAX)
}

#[async_trait]
impl SqlExecutor for MemorySqlExecutor {
    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        self.enter(sql).await?;
        let name = quoted_name(sql)
            .ok_or_else(|| AppError::ddl("", format!("unsupported statement: {}", sql)))?
            .to_string();
        let mut state = lock(&self.state)?;
        if sql.starts_with("CREATE TABLE ") {
            if state.tables.contains_key(&name) {
                return Err(AppError::ddl(&name, format!("relation \"{}\" already exists", name)));
            }
            let columns = parse_columns(sql);
            state.tables.insert(
                name,
                MemoryTable {
                    columns,
                    rows: Vec::new(),
                },
            );
            Ok(())
        } else if sql.starts_with("DROP TABLE ") {
            state
                .tables
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| AppError::ddl(&name, format!("table \"{}\" does not exist", name)))
        } else {
            Err(AppError::ddl(&name, format!("unsupported statement: {}", sql)))
        }
    }

    async fn row_exists(&self, sql: &str) -> Result<bool, AppError> {
        Ok(!self.fetch_rows(sql).await?.is_empty())
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        Ok(lock(&self.state)?.tables.keys().cloned().collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, AppError> {
        Ok(lock(&self.state)?
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        self.enter(sql).await?;
        let name = quoted_name(sql).unwrap_or_default();
        let state = lock(&self.state)?;
        let table = state
            .tables
            .get(name)
            .ok_or_else(|| AppError::ddl(name, format!("relation \"{}\" does not exist", name)))?;
        Ok(table.rows.iter().take(limit_of(sql)).cloned().collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{build_create, map_column, ScalarValue};

    #[test]
    fn parses_generated_create() {
        let sql = r#"CREATE TABLE "City" ("Name" varchar(40) NOT NULL,"Country" varchar(2) REFERENCES "Country"("code") NOT NULL,"createddate" timestamp DEFAULT CURRENT_TIMESTAMP);"#;
        assert_eq!(quoted_name(sql), Some("City"));
        assert_eq!(
            parse_columns(sql),
            vec![
                ("Name".to_string(), "varchar(40)".to_string()),
                ("Country".to_string(), "varchar(2)".to_string()),
                ("createddate".to_string(), "timestamp".to_string()),
            ]
        );
    }

    #[test]
    fn separators_inside_default_literals_are_not_column_breaks() {
        let mut note = ColumnSpec::new("Note", "string");
        note.default_value = Some(r#"a,"b"#.into());
        let cols = vec![map_column(&note, None), map_column(&ColumnSpec::new("Qty", "int"), None)];
        let sql = build_create("Memo", &cols);
        assert!(sql.contains(r#"DEFAULT 'a,"b'"#));
        assert_eq!(
            parse_columns(&sql),
            vec![
                ("Note".to_string(), "varchar(255)".to_string()),
                ("Qty".to_string(), "integer".to_string()),
                ("createddate".to_string(), "timestamp".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn executor_tracks_tables_and_rows() {
        let exec = MemorySqlExecutor::new();
        exec.execute(r#"CREATE TABLE "T" ("a" integer,"createddate" timestamp DEFAULT CURRENT_TIMESTAMP);"#)
            .await
            .unwrap();
        assert!(!exec.row_exists(r#"SELECT 1 FROM "T" LIMIT 1"#).await.unwrap());
        exec.insert_row("T", Row::new(vec![("a".into(), ScalarValue::Int(1))])).unwrap();
        exec.insert_row("T", Row::new(vec![("a".into(), ScalarValue::Int(2))])).unwrap();
        assert!(exec.row_exists(r#"SELECT 1 FROM "T" LIMIT 1"#).await.unwrap());
        assert_eq!(exec.fetch_rows(r#"SELECT * FROM "T" LIMIT 1"#).await.unwrap().len(), 1);
        assert!(exec.execute(r#"DROP TABLE "Missing""#).await.is_err());
        exec.execute(r#"DROP TABLE "T""#).await.unwrap();
        assert!(exec.list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_replace_keeps_matched_column_ids() {
        let store = MemoryMetadataStore::new();
        let e = store
            .create_entity("Orders", &[ColumnSpec::new("Id", "int"), ColumnSpec::new("Note", "string")])
            .await
            .unwrap();
        let id_col = e.columns[0].id;
        let replaced = store
            .replace_entity(e.id, "Orders2", &[ColumnSpec::new("Total", "int"), ColumnSpec::new("ID", "int")])
            .await
            .unwrap();
        assert_eq!(replaced.name, "Orders2");
        assert_eq!(replaced.columns[1].id, id_col);
        assert_eq!(replaced.columns[1].spec.name, "ID");
        assert_eq!(replaced.columns[1].position, 1);
        assert!(store.get_column(e.columns[1].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_rejects_duplicate_names_ignoring_case() {
        let store = MemoryMetadataStore::new();
        store.create_entity("Orders", &[]).await.unwrap();
        let err = store.create_entity("ORDERS", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
