//! SchemaEngine and the pieces it composes per call.

mod engine;
pub mod existence;
pub mod locks;
pub mod resolver;
mod unit;
pub use engine::{ColumnInfo, CreateTableOutcome, LookupRows, SchemaEngine};
pub use unit::UnitOfWork;
