//! Engine settings from environment. All names are prefixed `DYNTABLE_` except `DATABASE_URL`.

use crate::error::AppError;
use std::time::Duration;

/// How caller-supplied table and column names are checked before they reach DDL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Names are interpolated verbatim; only emptiness and length are checked.
    Trusted,
    /// Rejects characters that would break out of a quoted identifier or a default literal.
    Quoted,
    /// Letters, digits, underscore and space only, starting with a letter or underscore.
    Strict,
}

impl std::str::FromStr for IdentifierPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trusted" => Ok(IdentifierPolicy::Trusted),
            "quoted" => Ok(IdentifierPolicy::Quoted),
            "strict" => Ok(IdentifierPolicy::Strict),
            _ => Err(AppError::BadRequest(format!(
                "invalid identifier policy: {} (expected trusted, quoted or strict)",
                s
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Schema holding the `_sys_*` metadata tables.
    pub metadata_schema: String,
    /// Schema generated tables are created in and catalog lookups are scoped to.
    pub target_schema: String,
    /// Upper bound for any single metadata or database call.
    pub op_timeout: Duration,
    pub identifier_policy: IdentifierPolicy,
    /// Reject an evolve that renames an entity onto another entity's name.
    pub rename_collision_check: bool,
    /// Maximum rows returned by a lookup-row read.
    pub row_limit: u32,
    /// Fail with `ReferenceResolution` instead of falling back to `varchar` when a lookup target
    /// cannot be resolved.
    pub strict_lookups: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            metadata_schema: "dyntable".into(),
            target_schema: "public".into(),
            op_timeout: Duration::from_secs(30),
            identifier_policy: IdentifierPolicy::Quoted,
            rename_collision_check: true,
            row_limit: 100,
            strict_lookups: false,
        }
    }
}

impl EngineSettings {
    /// Read settings from process environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = EngineSettings::default();
        if let Some(v) = lookup("DYNTABLE_SCHEMA").filter(|s| !s.is_empty()) {
            settings.metadata_schema = v;
        }
        if let Some(v) = lookup("DYNTABLE_TARGET_SCHEMA").filter(|s| !s.is_empty()) {
            settings.target_schema = v;
        }
        if let Some(v) = lookup("DYNTABLE_OP_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| AppError::BadRequest(format!("DYNTABLE_OP_TIMEOUT_SECS: invalid value '{}'", v)))?;
            settings.op_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(v) = lookup("DYNTABLE_IDENTIFIER_POLICY") {
            settings.identifier_policy = v.parse()?;
        }
        if let Some(v) = lookup("DYNTABLE_RENAME_CHECK") {
            settings.rename_collision_check = parse_bool("DYNTABLE_RENAME_CHECK", &v)?;
        }
        if let Some(v) = lookup("DYNTABLE_ROW_LIMIT") {
            settings.row_limit = v
                .parse()
                .map_err(|_| AppError::BadRequest(format!("DYNTABLE_ROW_LIMIT: invalid value '{}'", v)))?;
        }
        if let Some(v) = lookup("DYNTABLE_STRICT_LOOKUPS") {
            settings.strict_lookups = parse_bool("DYNTABLE_STRICT_LOOKUPS", &v)?;
        }
        Ok(settings)
    }
}

fn parse_bool(key: &str, v: &str) -> Result<bool, AppError> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::BadRequest(format!("{}: invalid boolean '{}'", key, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = EngineSettings::from_lookup(|_| None).unwrap();
        assert_eq!(s.metadata_schema, "dyntable");
        assert_eq!(s.target_schema, "public");
        assert_eq!(s.identifier_policy, IdentifierPolicy::Quoted);
        assert!(s.rename_collision_check);
        assert_eq!(s.row_limit, 100);
        assert!(!s.strict_lookups);
    }

    #[test]
    fn reads_overrides() {
        let s = EngineSettings::from_lookup(lookup_from(&[
            ("DYNTABLE_SCHEMA", "meta"),
            ("DYNTABLE_OP_TIMEOUT_SECS", "5"),
            ("DYNTABLE_IDENTIFIER_POLICY", "STRICT"),
            ("DYNTABLE_RENAME_CHECK", "off"),
            ("DYNTABLE_STRICT_LOOKUPS", "yes"),
        ]))
        .unwrap();
        assert_eq!(s.metadata_schema, "meta");
        assert_eq!(s.op_timeout, Duration::from_secs(5));
        assert_eq!(s.identifier_policy, IdentifierPolicy::Strict);
        assert!(!s.rename_collision_check);
        assert!(s.strict_lookups);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(EngineSettings::from_lookup(lookup_from(&[("DYNTABLE_OP_TIMEOUT_SECS", "soon")])).is_err());
        assert!(EngineSettings::from_lookup(lookup_from(&[("DYNTABLE_IDENTIFIER_POLICY", "lax")])).is_err());
        assert!(EngineSettings::from_lookup(lookup_from(&[("DYNTABLE_STRICT_LOOKUPS", "maybe")])).is_err());
    }
}
