//! Calculation declarations as found in the schema.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::path::RelativePath;

/// Upper bound for `digits`; beyond this `f64` formatting is noise.
pub const MAX_DIGITS: u32 = 15;

/// `{ property_names, formula, digits? }`.
///
/// `property_names` is either a list of sibling property names (each name is
/// also its formula alias) or a map from alias to relative path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalculationSchema {
    #[serde(rename = "property_names", deserialize_with = "deserialize_inputs")]
    pub inputs: BTreeMap<String, RelativePath>,
    pub formula: String,
    #[serde(default)]
    pub digits: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInputs {
    Names(Vec<String>),
    Aliased(BTreeMap<String, RelativePath>),
}

fn deserialize_inputs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, RelativePath>, D::Error> {
    let inputs = match RawInputs::deserialize(deserializer)? {
        RawInputs::Names(names) => {
            let mut out = BTreeMap::new();
            for name in names {
                let path = RelativePath::parse(&name).map_err(de::Error::custom)?;
                if path.segments().len() != 1 {
                    return Err(de::Error::custom(format!(
                        "`{name}` must be a plain property name; use an alias map for paths"
                    )));
                }
                out.insert(name, path);
            }
            out
        }
        RawInputs::Aliased(map) => map,
    };
    for alias in inputs.keys() {
        if !is_formula_identifier(alias) {
            return Err(de::Error::custom(format!(
                "calculation alias `{alias}` is not a valid formula identifier"
            )));
        }
    }
    Ok(inputs)
}

fn is_formula_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
