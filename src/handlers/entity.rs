//! Table and entity handlers over SchemaEngine.

use crate::config::{ColumnSpec, TableDefinition};
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UpdateColumnsRequest {
    #[serde(alias = "new_name")]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
pub struct EntityDataQuery {
    pub entity_id: i32,
    pub key_column_id: i32,
    pub value_column_id: i32,
}

pub async fn create_table(
    State(state): State<AppState>,
    Json(def): Json<TableDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let outcome = state.engine.create_table(&def, &cancel).await?;
    Ok(success_one(outcome))
}

pub async fn list_tables(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let tables = state.engine.list_physical_tables(&cancel).await?;
    Ok(success_many(tables))
}

pub async fn table_details(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let details = state.engine.table_details(&cancel).await?;
    Ok(success_one_ok(details))
}

pub async fn tables_have_values(
    State(state): State<AppState>,
    Json(names): Json<Vec<String>>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let values = state.engine.tables_have_values(&names, &cancel).await?;
    Ok(success_one_ok(values))
}

pub async fn list_entities(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let entities = state.engine.list_entities(&cancel).await?;
    Ok(success_many(entities))
}

pub async fn entity_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let entity = state.engine.get_entity_info(&name, &cancel).await?;
    Ok(success_one_ok(entity))
}

pub async fn entity_exists(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let exists = state.engine.table_exists(&name, &cancel).await?;
    Ok(success_one_ok(serde_json::json!({ "name": name, "exists": exists })))
}

pub async fn entity_id(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let id = state.engine.get_entity_id_by_name(&name, &cancel).await?;
    if id == 0 {
        return Err(AppError::NotFound(format!("entity '{}'", name)));
    }
    Ok(success_one_ok(serde_json::json!({ "entity_id": id })))
}

pub async fn update_columns(
    State(state): State<AppState>,
    Path(entity_id): Path<i32>,
    Json(body): Json<UpdateColumnsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let outcome = state
        .engine
        .update_columns(entity_id, &body.name, &body.columns, &cancel)
        .await?;
    Ok(success_one_ok(outcome))
}

pub async fn entity_data(
    State(state): State<AppState>,
    Query(q): Query<EntityDataQuery>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let data = state
        .engine
        .get_entity_data(q.entity_id, q.key_column_id, q.value_column_id, &cancel)
        .await?;
    Ok(success_one_ok(data))
}

pub async fn entity_rows(
    State(state): State<AppState>,
    Path(entity_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = state.shutdown.child_token();
    let rows = state.engine.lookup_rows(entity_id, &cancel).await?;
    Ok(success_one_ok(rows))
}
