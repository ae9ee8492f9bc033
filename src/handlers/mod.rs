//! HTTP handlers for table creation, evolution and introspection.

pub mod entity;
pub use entity::*;
