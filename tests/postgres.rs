//! Round trips against a live PostgreSQL. Run with `DATABASE_URL=... cargo test -- --ignored`.

use dyntable_sdk::config::{ColumnSpec, EngineSettings, TableDefinition};
use dyntable_sdk::{connect, ensure_sys_tables, AppError, PgMetadataStore, PgSqlExecutor, SchemaEngine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn engine(suffix: &str) -> (SchemaEngine, sqlx::PgPool) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let settings = EngineSettings {
        metadata_schema: format!("dyntable_test_{}", suffix),
        target_schema: format!("dyntable_data_{}", suffix),
        ..EngineSettings::default()
    };
    let pool = connect(&url, &settings).await.unwrap();
    for schema in [&settings.metadata_schema, &settings.target_schema] {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query(&format!("CREATE SCHEMA {}", settings.target_schema))
        .execute(&pool)
        .await
        .unwrap();
    ensure_sys_tables(&pool, &settings.metadata_schema).await.unwrap();
    let store = Arc::new(PgMetadataStore::new(pool.clone(), settings.metadata_schema.clone()));
    let exec = Arc::new(PgSqlExecutor::new(pool.clone(), settings.target_schema.clone()));
    (SchemaEngine::new(store, exec, settings), pool)
}

#[tokio::test]
#[ignore]
async fn create_lookup_and_rebuild_against_postgres() {
    let (engine, pool) = engine("rt").await;
    let cancel = CancellationToken::new();

    let mut code = ColumnSpec::new("code", "string");
    code.max_length = Some(2);
    code.is_primary_key = true;
    let country = TableDefinition {
        name: "Country".into(),
        columns: vec![code, ColumnSpec::new("label", "string")],
    };
    engine.create_table(&country, &cancel).await.unwrap();
    let info = engine.get_entity_info("country", &cancel).await.unwrap();

    let city = TableDefinition {
        name: "City".into(),
        columns: vec![
            ColumnSpec::new("Name", "string"),
            ColumnSpec::lookup("Country", info.id, info.columns[0].id, info.columns[1].id),
        ],
    };
    let out = engine.create_table(&city, &cancel).await.unwrap();
    assert!(out.fallbacks.is_empty());

    let details = engine.table_details(&cancel).await.unwrap();
    let city_cols: Vec<&str> = details["City"].iter().map(|c| c.name.as_str()).collect();
    assert_eq!(city_cols, vec!["Name", "Country", "createddate"]);

    sqlx::query(r#"INSERT INTO "Country" ("code", "label") VALUES ('NL', 'Netherlands')"#)
        .execute(&pool)
        .await
        .unwrap();
    let values = engine
        .tables_have_values(&["Country".to_string(), "City".to_string()], &cancel)
        .await
        .unwrap();
    assert_eq!(values["Country"], true);
    assert_eq!(values["City"], false);

    let rows = engine.lookup_rows(info.id, &cancel).await.unwrap();
    assert_eq!(rows.rows.len(), 1);

    let city_id = engine.get_entity_id_by_name("City", &cancel).await.unwrap();
    let rebuilt = engine
        .update_columns(city_id, "Town", &[ColumnSpec::new("Name", "string")], &cancel)
        .await
        .unwrap();
    assert!(rebuilt.dropped);
    assert_eq!(
        engine.list_physical_tables(&cancel).await.unwrap(),
        vec!["Country".to_string(), "Town".to_string()]
    );

    let dup = engine
        .create_table(
            &TableDefinition {
                name: "TOWN".into(),
                columns: vec![],
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(dup, AppError::Validation(_)));
}
