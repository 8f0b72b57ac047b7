//! Declarative form schema.
//!
//! The schema is consumed as JSON and is immutable once parsed. It describes:
//! - the property tree (objects, arrays, leaf inputs)
//! - per-property condition trees controlling visibility
//! - per-property calculations producing automatic values
//! - array container markers (min/max items, style)
//! - per-field validation constraints
//!
//! `FormSchema::validate` performs structural checks that rendering relies on.
//! It does not evaluate conditions or formulas.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::Deserialize;

use crate::calc::formula::Formula;
use crate::errors::{FormError, FormResult};
use crate::path::validate_property_name;

pub mod calculation;
pub mod condition;

pub use calculation::{CalculationSchema, MAX_DIGITS};
pub use condition::{ConditionNode, EqualsKind, Expected};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Object,
    Array,
    Text,
    Quantity,
    Bool,
    User,
    ObjectReference,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Text => "text",
            Self::Quantity => "quantity",
            Self::Bool => "bool",
            Self::User => "user",
            Self::ObjectReference => "object_reference",
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayStyle {
    #[default]
    List,
    Table,
    HorizontalTable,
}

/// One property of the schema tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub calculation: Option<CalculationSchema>,

    // object
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub property_order: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,

    // array
    #[serde(default)]
    pub items: Option<Box<PropertySchema>>,
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub default_items: Option<usize>,
    #[serde(default)]
    pub style: ArrayStyle,

    // leaves
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_units")]
    pub units: Vec<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl PropertySchema {
    /// Properties in display order: `propertyOrder` first, then the rest by name.
    pub fn ordered_properties(&self) -> Vec<(&str, &PropertySchema)> {
        let mut out: Vec<(&str, &PropertySchema)> = Vec::with_capacity(self.properties.len());
        for name in &self.property_order {
            if let Some(p) = self.properties.get(name) {
                out.push((name.as_str(), p));
            }
        }
        for (name, p) in &self.properties {
            if !self.property_order.contains(name) {
                out.push((name.as_str(), p));
            }
        }
        out
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.iter().any(|r| r == property)
    }
}

fn deserialize_units<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Units {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Units::deserialize(deserializer)? {
        Units::One(u) => vec![u],
        Units::Many(v) => v,
    })
}

/// A complete form schema. The root must be an object.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    pub root: PropertySchema,
}

impl FormSchema {
    pub fn from_json_str(s: &str) -> FormResult<Self> {
        let root: PropertySchema = serde_json::from_str(s)?;
        let schema = Self { root };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_value(v: serde_json::Value) -> FormResult<Self> {
        let root: PropertySchema = serde_json::from_value(v)?;
        let schema = Self { root };
        schema.validate()?;
        Ok(schema)
    }

    /// Structural validation.
    ///
    /// Checks:
    /// - root is an object
    /// - property names survive the identifier round trip
    /// - `propertyOrder` and `required` only name existing properties
    /// - arrays declare `items` and a consistent `minItems <= maxItems`
    /// - calculations sit on text/quantity leaves, parse, and use declared aliases
    pub fn validate(&self) -> FormResult<()> {
        if self.root.kind != PropertyKind::Object {
            return Err(FormError::schema("root schema must be of type object"));
        }
        validate_node(&self.root, "object")
    }

    /// Count (containers, wrappers, calculations) declared anywhere in the tree.
    pub fn stats(&self) -> SchemaStats {
        let mut stats = SchemaStats::default();
        collect_stats(&self.root, &mut stats);
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaStats {
    pub containers: usize,
    pub wrappers: usize,
    pub calculations: usize,
}

fn collect_stats(node: &PropertySchema, stats: &mut SchemaStats) {
    if !node.conditions.is_empty() {
        stats.wrappers += 1;
    }
    if node.calculation.is_some() {
        stats.calculations += 1;
    }
    match node.kind {
        PropertyKind::Object => {
            for p in node.properties.values() {
                collect_stats(p, stats);
            }
        }
        PropertyKind::Array => {
            stats.containers += 1;
            if let Some(items) = &node.items {
                collect_stats(items, stats);
            }
        }
        _ => {}
    }
}

fn validate_node(node: &PropertySchema, at: &str) -> FormResult<()> {
    if let Some(calc) = &node.calculation {
        if !matches!(node.kind, PropertyKind::Text | PropertyKind::Quantity) {
            return Err(FormError::schema(format!(
                "{at}: calculation is only allowed on text or quantity properties, not {}",
                node.kind.as_str()
            )));
        }
        if calc.digits.is_some_and(|d| d > MAX_DIGITS) {
            return Err(FormError::schema(format!(
                "{at}: calculation digits must not exceed {MAX_DIGITS}"
            )));
        }
        let formula = Formula::parse(&calc.formula)
            .map_err(|e| FormError::schema(format!("{at}: formula: {e}")))?;
        for name in formula.variables() {
            if !calc.inputs.contains_key(name) {
                return Err(FormError::schema(format!(
                    "{at}: formula references undeclared input `{name}`"
                )));
            }
        }
    }

    match node.kind {
        PropertyKind::Object => {
            for (name, child) in &node.properties {
                validate_property_name(name)
                    .map_err(|reason| FormError::schema(format!("{at}: {reason}")))?;
                validate_node(child, &format!("{at}.{name}"))?;
            }
            for name in node.property_order.iter().chain(node.required.iter()) {
                if !node.properties.contains_key(name) {
                    return Err(FormError::schema(format!(
                        "{at}: `{name}` is not a declared property"
                    )));
                }
            }
        }
        PropertyKind::Array => {
            let items = node
                .items
                .as_ref()
                .ok_or_else(|| FormError::schema(format!("{at}: array requires `items`")))?;
            if let (Some(min), Some(max)) = (node.min_items, node.max_items) {
                if min > max {
                    return Err(FormError::schema(format!(
                        "{at}: minItems ({min}) exceeds maxItems ({max})"
                    )));
                }
            }
            if let (Some(d), Some(max)) = (node.default_items, node.max_items) {
                if d > max {
                    return Err(FormError::schema(format!(
                        "{at}: defaultItems ({d}) exceeds maxItems ({max})"
                    )));
                }
            }
            validate_node(items, &format!("{at}.*"))?;
        }
        _ => {}
    }
    Ok(())
}
