//! Configuration structures for formstate-core.
//!
//! This module defines explicit, serializable configuration objects used by the
//! controller and its components to control identifier rendering, number
//! parsing/formatting, cascade bounds and rendering limits.
//!
//! The core crate itself does not read environment variables or files. All
//! configuration must be provided explicitly by the caller (the CLI reads an
//! optional JSON file and applies flag overrides on top of the defaults).

use serde::{Deserialize, Serialize};

use crate::errors::{FormError, FormResult};

/// Global configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ids: IdConfig,
    pub numbers: NumberFormatConfig,
    pub cascade: CascadeConfig,
    pub limits: LimitsConfig,
}

/// Identifier rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    /// Prefix of every field identifier (`<root>__<segment>...`).
    pub root_prefix: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            root_prefix: crate::defaults::ROOT_PREFIX.to_string(),
        }
    }
}

/// Locale-aware number handling for calculation inputs and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormatConfig {
    pub decimal_delimiter: char,
}

impl Default for NumberFormatConfig {
    fn default() -> Self {
        Self {
            decimal_delimiter: crate::defaults::DECIMAL_DELIMITER,
        }
    }
}

/// Bounds applied to one change cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Hard limit on events processed by a single cascade.
    pub max_events: usize,
    pub cycle_policy: CyclePolicy,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            cycle_policy: CyclePolicy::Bounded,
        }
    }
}

/// What to do with calculations whose resolved inputs form a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Keep the cycle; propagation stops once a target repeats in a cascade.
    Bounded,
    /// Refuse to build a controller over a cyclic calculation graph.
    Reject,
}

impl CyclePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bounded => "bounded",
            Self::Reject => "reject",
        }
    }
}

/// Rendering limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_depth: usize,
    pub max_fields: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_fields: 100_000,
        }
    }
}

/// Validate a full configuration object.
pub fn validate_config(cfg: &EngineConfig) -> FormResult<()> {
    if cfg.ids.root_prefix.is_empty() {
        return Err(FormError::invalid_argument("root_prefix must not be empty"));
    }

    if cfg.ids.root_prefix.contains("__") {
        return Err(FormError::invalid_argument(
            "root_prefix must not contain the segment separator `__`",
        ));
    }

    if !matches!(cfg.numbers.decimal_delimiter, '.' | ',') {
        return Err(FormError::invalid_argument(format!(
            "unsupported decimal delimiter: {:?}",
            cfg.numbers.decimal_delimiter
        )));
    }

    if cfg.cascade.max_events == 0 {
        return Err(FormError::invalid_argument(
            "cascade.max_events must be greater than zero",
        ));
    }

    if cfg.limits.max_depth == 0 || cfg.limits.max_fields == 0 {
        return Err(FormError::invalid_argument(
            "limits must be greater than zero",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = EngineConfig::default();
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn unsupported_delimiter_detected() {
        let mut cfg = EngineConfig::default();
        cfg.numbers.decimal_delimiter = ';';
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn separator_in_root_detected() {
        let mut cfg = EngineConfig::default();
        cfg.ids.root_prefix = "a__b".to_string();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"numbers":{"decimal_delimiter":","}}"#).unwrap();
        assert_eq!(cfg.numbers.decimal_delimiter, ',');
        assert_eq!(cfg.ids.root_prefix, "object");
        assert_eq!(cfg.cascade.cycle_policy, CyclePolicy::Bounded);
    }
}
