//! Configuration loading and representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_inventory::DEFAULT_STOCK_MINIMO;
use atelier_orders::WorkflowPolicy;

pub const ENV_RESTORE_STOCK_ON_CANCEL: &str = "ATELIER_RESTORE_STOCK_ON_CANCEL";
pub const ENV_RESTORE_STOCK_ON_DELETE: &str = "ATELIER_RESTORE_STOCK_ON_DELETE";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "ATELIER_MAX_CONFLICT_RETRIES";
pub const ENV_DEFAULT_STOCK_MINIMO: &str = "ATELIER_DEFAULT_STOCK_MINIMO";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Workshop behaviour switches.
///
/// Both stock restores default to off: cancelling or deleting an order keeps
/// whatever it already took out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkshopConfig {
    pub restore_stock_on_cancel: bool,
    pub restore_stock_on_delete: bool,
    /// Re-plan attempts after an optimistic concurrency conflict.
    pub max_conflict_retries: u32,
    /// Minimum applied to new products created without one.
    pub default_stock_minimo: u32,
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        Self {
            restore_stock_on_cancel: false,
            restore_stock_on_delete: false,
            max_conflict_retries: 3,
            default_stock_minimo: DEFAULT_STOCK_MINIMO,
        }
    }
}

impl WorkshopConfig {
    /// Read overrides from `ATELIER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_RESTORE_STOCK_ON_CANCEL) {
            config.restore_stock_on_cancel = parse_bool(ENV_RESTORE_STOCK_ON_CANCEL, &v)?;
        }
        if let Some(v) = lookup(ENV_RESTORE_STOCK_ON_DELETE) {
            config.restore_stock_on_delete = parse_bool(ENV_RESTORE_STOCK_ON_DELETE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            config.max_conflict_retries = parse_u32(ENV_MAX_CONFLICT_RETRIES, &v)?;
        }
        if let Some(v) = lookup(ENV_DEFAULT_STOCK_MINIMO) {
            config.default_stock_minimo = parse_u32(ENV_DEFAULT_STOCK_MINIMO, &v)?;
        }
        Ok(config)
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn workflow_policy(&self) -> WorkflowPolicy {
        WorkflowPolicy {
            restore_stock_on_cancel: self.restore_stock_on_cancel,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_u32(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_keep_stock_consumed() {
        let config = WorkshopConfig::default();
        assert!(!config.restore_stock_on_cancel);
        assert!(!config.restore_stock_on_delete);
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.default_stock_minimo, 5);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = WorkshopConfig::from_lookup(lookup_from(&[
            (ENV_RESTORE_STOCK_ON_CANCEL, "true"),
            (ENV_MAX_CONFLICT_RETRIES, " 7 "),
        ]))
        .unwrap();
        assert!(config.restore_stock_on_cancel);
        assert!(!config.restore_stock_on_delete);
        assert_eq!(config.max_conflict_retries, 7);
        assert!(config.workflow_policy().restore_stock_on_cancel);
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let err = WorkshopConfig::from_lookup(lookup_from(&[(ENV_DEFAULT_STOCK_MINIMO, "-2")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, ENV_DEFAULT_STOCK_MINIMO),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = WorkshopConfig::from_lookup(lookup_from(&[(ENV_RESTORE_STOCK_ON_DELETE, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let config = WorkshopConfig::from_json(r#"{"restore_stock_on_delete": true}"#).unwrap();
        assert!(config.restore_stock_on_delete);
        assert_eq!(config.max_conflict_retries, 3);

        assert!(matches!(
            WorkshopConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
