use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use dyntable_sdk::{
    common_routes_with_ready, entity_routes, AppState, EngineSettings, MemoryMetadataStore, MemorySqlExecutor,
    SchemaEngine,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let engine = SchemaEngine::new(
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(MemorySqlExecutor::new()),
        EngineSettings::default(),
    );
    let state = AppState::new(engine);
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn create_then_introspect_over_http() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/tables",
        Some(json!({
            "name": "Invoice",
            "columns": [
                { "name": "Amount", "type": "int" },
                { "name": "IsPaid", "type": "Boolean", "isNullable": true }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["message"], "Table 'Invoice' created successfully.");
    let statement = body["data"]["statement"].as_str().unwrap();
    assert!(statement.contains(r#""Amount" integer NOT NULL,"IsPaid" boolean,"#));
    let id = body["data"]["entity_id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", "/api/v1/entities/invoice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["columns"][1]["name"], "IsPaid");
    assert_eq!(body["data"]["columns"][1]["type"], "boolean");

    let (_, body) = send(&app, "GET", "/api/v1/entities/INVOICE/exists", None).await;
    assert_eq!(body["data"]["exists"], true);

    let (status, body) = send(&app, "GET", "/api/v1/entities/Invoice/id", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entity_id"].as_i64(), Some(id));

    let (status, body) = send(&app, "GET", "/api/v1/tables", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["Invoice"]));
    assert_eq!(body["meta"]["count"], 1);
}

#[tokio::test]
async fn duplicate_create_maps_to_validation_error() {
    let app = app();
    let def = json!({ "name": "Orders", "columns": [] });
    let (status, _) = send(&app, "POST", "/api/v1/tables", Some(def)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, "POST", "/api/v1/tables", Some(json!({ "name": "orders" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn has_values_and_unknown_lookups() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/v1/tables/has-values", Some(json!(["Ghost"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "Ghost": false }));

    let (status, body) = send(&app, "GET", "/api/v1/entities/Ghost/id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/entity-data?entity_id=1&key_column_id=2&value_column_id=3",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_columns_rebuilds_table() {
    let app = app();
    let (_, body) = send(
        &app,
        "POST",
        "/api/v1/tables",
        Some(json!({ "name": "Orders", "columns": [{ "name": "Id", "type": "int" }] })),
    )
    .await;
    let id = body["data"]["entity_id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/v1/entity-columns/{}", id),
        Some(json!({ "name": "Orders2", "columns": [{ "name": "Total", "type": "int" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["entity"]["name"], "Orders2");

    let (_, body) = send(&app, "GET", "/api/v1/entities/Orders/exists", None).await;
    assert_eq!(body["data"]["exists"], false);
    let (_, body) = send(&app, "GET", &format!("/api/v1/entity-rows/{}", id), None).await;
    assert_eq!(body["data"]["table"], "Orders2");
    assert_eq!(body["data"]["rows"], json!([]));
}

#[tokio::test]
async fn health_and_ready() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}
