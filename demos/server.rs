//! Demo server: ensures the database and `_sys_*` tables exist, then mounts common and table routes.

use axum::Router;
use dyntable_sdk::{
    common_routes_with_ready, connect, ensure_database_exists, ensure_sys_tables, entity_routes, AppState,
    EngineSettings, PgMetadataStore, PgSqlExecutor, SchemaEngine,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dyntable_sdk=info".parse()?))
        .init();

    let settings = EngineSettings::from_env()?;
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/dyntable".into());
    ensure_database_exists(&database_url).await?;
    let pool = connect(&database_url, &settings).await?;
    ensure_sys_tables(&pool, &settings.metadata_schema).await?;

    let store = Arc::new(PgMetadataStore::new(pool.clone(), settings.metadata_schema.clone()));
    let executor = Arc::new(PgSqlExecutor::new(pool, settings.target_schema.clone()));
    let state = AppState::new(SchemaEngine::new(store, executor, settings));
    let shutdown = state.shutdown.clone();

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
