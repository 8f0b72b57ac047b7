use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use formstate_core::config::{validate_config, EngineConfig};
use formstate_core::schema::FormSchema;

pub fn read_json_file<P: AsRef<Path>>(path: P) -> Result<serde_json::Value> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let v: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid json in {}: {e}", path.display()))?;
    Ok(v)
}

pub fn read_schema(path: &str) -> Result<FormSchema> {
    let v = read_json_file(path)?;
    FormSchema::from_value(v).with_context(|| format!("loading schema {path}"))
}

pub fn read_data(path: Option<&str>) -> Result<Option<serde_json::Value>> {
    path.map(read_json_file).transpose()
}

/// Defaults, then the config file, then flag overrides.
pub fn load_config(path: Option<&str>, decimal_delimiter: Option<char>) -> Result<EngineConfig> {
    let mut cfg = match path {
        Some(p) => serde_json::from_value(read_json_file(p)?)
            .map_err(|e| anyhow!("invalid config {p}: {e}"))?,
        None => EngineConfig::default(),
    };
    if let Some(d) = decimal_delimiter {
        cfg.numbers.decimal_delimiter = d;
    }
    validate_config(&cfg)?;
    Ok(cfg)
}
