//! dyntable SDK: tables described as typed column metadata, synthesized into PostgreSQL DDL,
//! rebuilt on change and introspected.

pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{ColumnSpec, EngineSettings, EntityDefinition, IdentifierPolicy, LogicalType, TableDefinition};
pub use error::{AppError, EvolveStep};
pub use memory::{MemoryMetadataStore, MemorySqlExecutor};
pub use migration::{EvolutionStrategy, EvolveOutcome, RebuildStrategy};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use service::{CreateTableOutcome, SchemaEngine, UnitOfWork};
pub use sql::{PgSqlExecutor, SqlExecutor, TypeResolution};
pub use state::AppState;
pub use store::{connect, ensure_database_exists, ensure_sys_tables, MetadataStore, PgMetadataStore};
