//! Table and column definition types: request shapes and stored metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical column type vocabulary. Parsing is case-insensitive; anything unrecognised is kept
/// verbatim as `Other` and maps to a plain `varchar`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalType {
    Int,
    String,
    Char,
    Boolean,
    Date,
    Time,
    Timestamp,
    Lookup,
    Other(String),
}

impl LogicalType {
    pub fn as_str(&self) -> &str {
        match self {
            LogicalType::Int => "int",
            LogicalType::String => "string",
            LogicalType::Char => "char",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Time => "time",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Lookup => "lookup",
            LogicalType::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for LogicalType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "int" => LogicalType::Int,
            "string" => LogicalType::String,
            "char" => LogicalType::Char,
            "boolean" => LogicalType::Boolean,
            "date" => LogicalType::Date,
            "time" => LogicalType::Time,
            "timestamp" => LogicalType::Timestamp,
            "lookup" => LogicalType::Lookup,
            _ => LogicalType::Other(s.to_string()),
        }
    }
}

impl From<String> for LogicalType {
    fn from(s: String) -> Self {
        LogicalType::from(s.as_str())
    }
}

impl From<LogicalType> for String {
    fn from(t: LogicalType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied column shape. Everything a caller may set on a column, nothing the store assigns.
/// Fields also accept their camelCase spelling. A missing `is_nullable` means NOT NULL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    #[serde(default)]
    pub length: i32,
    #[serde(default, alias = "minLength")]
    pub min_length: Option<i32>,
    #[serde(default, alias = "maxLength")]
    pub max_length: Option<i32>,
    #[serde(default, alias = "minRange")]
    pub min_range: Option<i32>,
    #[serde(default, alias = "maxRange")]
    pub max_range: Option<i32>,
    #[serde(default, alias = "dateMin")]
    pub date_min: Option<String>,
    #[serde(default, alias = "dateMax")]
    pub date_max: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "defaultValue")]
    pub default_value: Option<String>,
    #[serde(default, alias = "isNullable")]
    pub is_nullable: bool,
    #[serde(default, alias = "isPrimaryKey")]
    pub is_primary_key: bool,
    #[serde(default, alias = "lookupEntityId")]
    pub lookup_entity_id: Option<i32>,
    #[serde(default, alias = "lookupKeyColumnId")]
    pub lookup_key_column_id: Option<i32>,
    #[serde(default, alias = "lookupValueColumnId")]
    pub lookup_value_column_id: Option<i32>,
    #[serde(default, alias = "trueLabel")]
    pub true_label: Option<String>,
    #[serde(default, alias = "falseLabel")]
    pub false_label: Option<String>,
}

impl ColumnSpec {
    /// NOT NULL column of the given type with every optional attribute unset.
    pub fn new(name: impl Into<String>, logical_type: impl Into<LogicalType>) -> Self {
        ColumnSpec {
            name: name.into(),
            logical_type: logical_type.into(),
            length: 0,
            min_length: None,
            max_length: None,
            min_range: None,
            max_range: None,
            date_min: None,
            date_max: None,
            description: None,
            default_value: None,
            is_nullable: false,
            is_primary_key: false,
            lookup_entity_id: None,
            lookup_key_column_id: None,
            lookup_value_column_id: None,
            true_label: None,
            false_label: None,
        }
    }

    /// Lookup column pointing at another entity's key/value columns.
    pub fn lookup(name: impl Into<String>, entity_id: i32, key_column_id: i32, value_column_id: i32) -> Self {
        ColumnSpec {
            lookup_entity_id: Some(entity_id),
            lookup_key_column_id: Some(key_column_id),
            lookup_value_column_id: Some(value_column_id),
            ..ColumnSpec::new(name, LogicalType::Lookup)
        }
    }
}

/// Stored column metadata row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub id: i32,
    pub entity_id: i32,
    /// Zero-based order within the entity; generated DDL follows it.
    pub position: i32,
    #[serde(flatten)]
    pub spec: ColumnSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored entity with its columns in position order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: i32,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityDefinition {
    pub fn column_by_id(&self, id: i32) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        self.columns.iter().map(|c| c.spec.clone()).collect()
    }
}

/// Request body for creating a table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: i32,
    pub name: String,
}

/// Display metadata for a lookup: which table, and which of its columns hold key and label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityData {
    pub entity_name: String,
    pub key_column_name: String,
    pub value_column_name: String,
}
