//! DDL synthesis: type mapping, statement building, execution seam and typed rows.

mod ddl;
pub mod executor;
mod type_map;
pub mod value;
pub use ddl::*;
pub use executor::*;
pub use type_map::*;
pub use value::*;

/// Wrap an identifier in double quotes. Embedded quotes are not escaped; names are checked
/// against the identifier policy before they reach statement building.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}
