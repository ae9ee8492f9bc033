//! Definition validation: required names, case-insensitive column uniqueness, identifier policy.

use crate::config::{ColumnSpec, IdentifierPolicy, TableDefinition};
use crate::error::AppError;
use regex::Regex;
use std::collections::HashSet;

/// PostgreSQL truncates identifiers past this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Name of the audit column appended to every generated table.
pub const AUDIT_COLUMN: &str = "createddate";

const STRICT_IDENTIFIER: &str = r"^[A-Za-z_][A-Za-z0-9_ ]*$";

pub fn validate_identifier(kind: &str, name: &str, policy: IdentifierPolicy) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(format!("{} name is required", kind)));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "{} name '{}' exceeds {} bytes",
            kind, name, MAX_IDENTIFIER_LEN
        )));
    }
    match policy {
        IdentifierPolicy::Trusted => Ok(()),
        IdentifierPolicy::Quoted => {
            if name.contains('"') || name.contains('\0') {
                return Err(AppError::Validation(format!(
                    "{} name '{}' contains a double quote or NUL",
                    kind, name
                )));
            }
            Ok(())
        }
        IdentifierPolicy::Strict => {
            let re = Regex::new(STRICT_IDENTIFIER)
                .map_err(|_| AppError::Validation("invalid identifier pattern".into()))?;
            if !re.is_match(name) {
                return Err(AppError::Validation(format!(
                    "{} name '{}' must match [A-Za-z_][A-Za-z0-9_ ]*",
                    kind, name
                )));
            }
            Ok(())
        }
    }
}

/// Validate a column list: names present and unique ignoring case, none shadowing the audit column,
/// defaults safe for literal interpolation under non-trusted policies.
pub fn validate_columns(columns: &[ColumnSpec], policy: IdentifierPolicy) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for c in columns {
        validate_identifier("column", &c.name, policy)?;
        let folded = c.name.to_lowercase();
        if folded == AUDIT_COLUMN {
            return Err(AppError::Validation(format!(
                "column name '{}' is reserved for the audit column",
                c.name
            )));
        }
        if !seen.insert(folded) {
            return Err(AppError::Validation(format!("duplicate column name: {}", c.name)));
        }
        if policy != IdentifierPolicy::Trusted {
            if let Some(d) = c.default_value.as_deref() {
                if d.contains('\'') {
                    return Err(AppError::Validation(format!(
                        "default value for column '{}' contains a single quote",
                        c.name
                    )));
                }
            }
        }
    }
    Ok(())
}

pub fn validate_definition(def: &TableDefinition, policy: IdentifierPolicy) -> Result<(), AppError> {
    validate_identifier("table", &def.name, policy)?;
    validate_columns(&def.columns, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_columns_differing_in_case_rejected() {
        let cols = vec![ColumnSpec::new("Amount", "int"), ColumnSpec::new("AMOUNT", "string")];
        let err = validate_columns(&cols, IdentifierPolicy::Quoted).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("AMOUNT")));
    }

    #[test]
    fn audit_column_name_reserved() {
        let cols = vec![ColumnSpec::new("CreatedDate", "timestamp")];
        assert!(validate_columns(&cols, IdentifierPolicy::Trusted).is_err());
    }

    #[test]
    fn empty_and_overlong_names_rejected() {
        assert!(validate_identifier("table", "  ", IdentifierPolicy::Trusted).is_err());
        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier("table", &long, IdentifierPolicy::Trusted).is_err());
    }

    #[test]
    fn quoted_policy_blocks_quote_breakout() {
        assert!(validate_identifier("table", "a\"; DROP TABLE x; --", IdentifierPolicy::Quoted).is_err());
        assert!(validate_identifier("table", "a\"; DROP TABLE x; --", IdentifierPolicy::Trusted).is_ok());
        assert!(validate_identifier("table", "Order Lines", IdentifierPolicy::Quoted).is_ok());

        let mut c = ColumnSpec::new("Note", "string");
        c.default_value = Some("it's".into());
        assert!(validate_columns(&[c.clone()], IdentifierPolicy::Quoted).is_err());
        assert!(validate_columns(&[c], IdentifierPolicy::Trusted).is_ok());
    }

    #[test]
    fn strict_policy_allow_list() {
        assert!(validate_identifier("column", "Is_Paid 2", IdentifierPolicy::Strict).is_ok());
        assert!(validate_identifier("column", "2fast", IdentifierPolicy::Strict).is_err());
        assert!(validate_identifier("column", "price-usd", IdentifierPolicy::Strict).is_err());
    }
}
