//! Table and entity routes.

use crate::handlers::entity::{
    create_table, entity_data, entity_exists, entity_id, entity_info, entity_rows, list_entities, list_tables,
    table_details, tables_have_values, update_columns,
};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies carry table definitions only.
const BODY_LIMIT: usize = 1024 * 1024;

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/tables", get(list_tables).post(create_table))
        .route("/tables/details", get(table_details))
        .route("/tables/has-values", post(tables_have_values))
        .route("/entities", get(list_entities))
        .route("/entities/:name", get(entity_info))
        .route("/entities/:name/exists", get(entity_exists))
        .route("/entities/:name/id", get(entity_id))
        .route("/entity-columns/:entity_id", put(update_columns))
        .route("/entity-data", get(entity_data))
        .route("/entity-rows/:entity_id", get(entity_rows))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}
