//! Typed rows read back from generated tables.

use crate::config::LogicalType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sqlx::postgres::PgRow;

/// A single cell, covering the same vocabulary as column definitions.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Int(i64),
    String(String),
    Char(String),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl ScalarValue {
    pub fn logical_type(&self) -> Option<LogicalType> {
        Some(match self {
            ScalarValue::Null => return None,
            ScalarValue::Int(_) => LogicalType::Int,
            ScalarValue::String(_) => LogicalType::String,
            ScalarValue::Char(_) => LogicalType::Char,
            ScalarValue::Boolean(_) => LogicalType::Boolean,
            ScalarValue::Date(_) => LogicalType::Date,
            ScalarValue::Time(_) => LogicalType::Time,
            ScalarValue::Timestamp(_) => LogicalType::Timestamp,
        })
    }
}

/// Ordered `(column, value)` pairs. Serializes as a JSON object in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(pub Vec<(String, ScalarValue)>);

impl Row {
    pub fn new(cells: Vec<(String, ScalarValue)>) -> Self {
        Row(cells)
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub fn row_from_pg(row: &PgRow) -> Row {
    use sqlx::{Column, TypeInfo};
    use sqlx::Row as _;
    let cells = row
        .columns()
        .iter()
        .map(|col| {
            let v = cell_to_scalar(row, col.ordinal(), col.type_info().name());
            (col.name().to_string(), v)
        })
        .collect();
    Row(cells)
}

fn cell_to_scalar(row: &PgRow, idx: usize, type_name: &str) -> ScalarValue {
    use sqlx::Row as _;
    let v = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(idx).ok().flatten().map(|n| ScalarValue::Int(n.into())),
        "INT4" => row.try_get::<Option<i32>, _>(idx).ok().flatten().map(|n| ScalarValue::Int(n.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx).ok().flatten().map(ScalarValue::Int),
        "BOOL" => row.try_get::<Option<bool>, _>(idx).ok().flatten().map(ScalarValue::Boolean),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx).ok().flatten().map(ScalarValue::Date),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(idx).ok().flatten().map(ScalarValue::Time),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(ScalarValue::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|d| ScalarValue::Timestamp(d.naive_utc())),
        "BPCHAR" | "CHAR" => row.try_get::<Option<String>, _>(idx).ok().flatten().map(ScalarValue::Char),
        _ => row.try_get::<Option<String>, _>(idx).ok().flatten().map(ScalarValue::String),
    };
    v.unwrap_or(ScalarValue::Null)
}
