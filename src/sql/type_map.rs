//! Logical column type to PostgreSQL column definition.

use crate::config::{ColumnSpec, LogicalType};
use crate::sql::quoted;
use serde::Serialize;

/// Width used for `string` columns that declare no positive max length.
pub const DEFAULT_VARCHAR_LEN: i32 = 255;

/// Outcome of mapping one column. A lookup whose target cannot be resolved still produces a
/// usable column, but callers can tell it apart from a real mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeResolution {
    Resolved { physical_type: String },
    FallbackApplied { reason: String },
}

impl TypeResolution {
    pub fn is_fallback(&self) -> bool {
        matches!(self, TypeResolution::FallbackApplied { .. })
    }
}

/// What a lookup column points at, as far as the caller could find out.
#[derive(Clone, Copy, Debug)]
pub enum LookupTarget<'a> {
    Found { table: &'a str, key_column: &'a ColumnSpec },
    Missing(&'a str),
}

/// One column ready for DDL: quoted name, physical type and trailing constraint clauses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedColumn {
    pub name: String,
    pub type_clause: String,
    pub constraints: Vec<String>,
    pub resolution: TypeResolution,
}

impl MappedColumn {
    /// `"name" type[ clause]*`
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quoted(&self.name), self.type_clause);
        for c in &self.constraints {
            def.push(' ');
            def.push_str(c);
        }
        def
    }
}

/// Physical type for a non-lookup logical type. `lookup` and unknown names map to bare `varchar`.
pub fn scalar_type(logical: &LogicalType, length: i32, max_length: Option<i32>) -> String {
    match logical {
        LogicalType::Int => "integer".into(),
        LogicalType::Date => "date".into(),
        LogicalType::Boolean => "boolean".into(),
        LogicalType::Time => "time".into(),
        LogicalType::Timestamp => "timestamp".into(),
        LogicalType::String => {
            let n = max_length.filter(|n| *n > 0).unwrap_or(DEFAULT_VARCHAR_LEN);
            format!("varchar({})", n)
        }
        // Only an explicit length of 1 is emitted; any other length yields bare char.
        LogicalType::Char if length == 1 => format!("char({})", length),
        LogicalType::Char => "char".into(),
        LogicalType::Lookup | LogicalType::Other(_) => "varchar".into(),
    }
}

/// Map a column. `target` is consulted only for lookup columns.
pub fn map_column(column: &ColumnSpec, target: Option<LookupTarget<'_>>) -> MappedColumn {
    if column.logical_type != LogicalType::Lookup {
        let physical = scalar_type(&column.logical_type, column.length, column.max_length);
        let mut constraints = Vec::new();
        if !column.is_nullable {
            constraints.push("NOT NULL".to_string());
        }
        push_default_and_key(column, &mut constraints);
        return MappedColumn {
            name: column.name.clone(),
            type_clause: physical.clone(),
            constraints,
            resolution: TypeResolution::Resolved { physical_type: physical },
        };
    }

    match target {
        Some(LookupTarget::Found { table, key_column }) if key_column.logical_type != LogicalType::Lookup => {
            let physical = scalar_type(&key_column.logical_type, key_column.length, key_column.max_length);
            let mut constraints = vec![
                format!("REFERENCES {}({})", quoted(table), quoted(&key_column.name)),
                "NOT NULL".to_string(),
            ];
            push_default_and_key(column, &mut constraints);
            MappedColumn {
                name: column.name.clone(),
                type_clause: physical.clone(),
                constraints,
                resolution: TypeResolution::Resolved { physical_type: physical },
            }
        }
        Some(LookupTarget::Found { key_column, .. }) => fallback(
            column,
            format!("target key column '{}' is itself a lookup", key_column.name),
        ),
        Some(LookupTarget::Missing(reason)) => fallback(column, reason.to_string()),
        None => fallback(column, "lookup target was not resolved".to_string()),
    }
}

fn fallback(column: &ColumnSpec, reason: String) -> MappedColumn {
    MappedColumn {
        name: column.name.clone(),
        type_clause: "varchar".into(),
        constraints: Vec::new(),
        resolution: TypeResolution::FallbackApplied { reason },
    }
}

fn push_default_and_key(column: &ColumnSpec, constraints: &mut Vec<String>) {
    if let Some(d) = column.default_value.as_deref().filter(|d| !d.is_empty()) {
        constraints.push(format!("DEFAULT '{}'", d));
    }
    if column.is_primary_key {
        constraints.push("PRIMARY KEY".to_string());
    }
}
