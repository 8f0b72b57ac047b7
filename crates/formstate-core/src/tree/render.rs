//! Rendering: schema (+ optional initial data) -> `FieldTree`.
//!
//! Rules:
//! - objects become group nodes, their properties rendered in display order
//! - arrays become container nodes plus their initial items: the data array
//!   length, else `defaultItems`, else `minItems`
//! - leaves become fields; the initial value comes from data, then `default`
//! - a property with conditions gets a visible wrapper region
//!
//! Rendering is also used by the array manager to materialize new items from a
//! container's template.

use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::errors::{FormError, FormResult};
use crate::path::FieldPath;
use crate::schema::{ArrayStyle, FormSchema, PropertyKind, PropertySchema};
use crate::tree::{
    ArrayContainer, ContainerKind, Field, FieldConstraints, FieldKind, FieldTree, Node, NodeBody,
};

/// Render a whole form.
pub fn render_form(schema: &FormSchema, data: Option<&Value>, config: &EngineConfig) -> FormResult<FieldTree> {
    let mut tree = FieldTree::new();
    render_subtree(&mut tree, &FieldPath::root(), &schema.root, data, true, config)?;

    let fields = tree.fields().count();
    if fields > config.limits.max_fields {
        return Err(FormError::invalid_argument(format!(
            "form renders {fields} fields, limit is {}",
            config.limits.max_fields
        )));
    }
    Ok(tree)
}

/// Render `schema` at `path` into `tree`.
///
/// `required` tells whether the parent object lists this property as required.
/// Object and array items of a container count as required; leaf items do not.
pub fn render_subtree(
    tree: &mut FieldTree,
    path: &FieldPath,
    schema: &PropertySchema,
    data: Option<&Value>,
    required: bool,
    config: &EngineConfig,
) -> FormResult<()> {
    if path.len() > config.limits.max_depth {
        return Err(FormError::invalid_argument(format!(
            "{path}: nesting exceeds max_depth {}",
            config.limits.max_depth
        )));
    }

    let data = data.filter(|v| !v.is_null()).or(schema.default.as_ref());

    let body = match schema.kind {
        PropertyKind::Object => NodeBody::Group,
        PropertyKind::Array => NodeBody::Container(container_for(schema, data, required)?),
        _ => NodeBody::Field(field_for(schema, data, required)),
    };

    tree.insert(
        path.clone(),
        Node {
            body,
            conditions: schema.conditions.clone(),
            calculation: schema.calculation.clone(),
        },
    );

    match schema.kind {
        PropertyKind::Object => {
            let obj = data.and_then(Value::as_object);
            for (name, child) in schema.ordered_properties() {
                render_subtree(
                    tree,
                    &path.child(name),
                    child,
                    obj.and_then(|o| o.get(name)),
                    schema.is_required(name),
                    config,
                )?;
            }
        }
        PropertyKind::Array => {
            let items = schema
                .items
                .as_deref()
                .ok_or_else(|| FormError::schema(format!("{path}: array requires `items`")))?;
            let count = initial_item_count(schema, data);
            let column_count = tree.container(path).and_then(|c| c.column_count);
            let rows = data.and_then(Value::as_array);
            for i in 0..count {
                let item_data = rows.and_then(|r| r.get(i)).cloned().or_else(|| {
                    column_count.map(|cols| Value::Array(vec![Value::Null; cols]))
                });
                render_subtree(tree, &path.item(i), items, item_data.as_ref(), !items.kind.is_leaf(), config)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn initial_item_count(schema: &PropertySchema, data: Option<&Value>) -> usize {
    match data.and_then(Value::as_array) {
        Some(a) => a.len(),
        None => schema
            .default_items
            .unwrap_or_else(|| schema.min_items.unwrap_or(0)),
    }
}

fn container_for(schema: &PropertySchema, data: Option<&Value>, required: bool) -> FormResult<ArrayContainer> {
    let template = schema
        .items
        .as_deref()
        .cloned()
        .ok_or_else(|| FormError::schema("array requires `items`"))?;

    let kind = match schema.style {
        ArrayStyle::List => ContainerKind::List,
        ArrayStyle::Table => ContainerKind::TableRow,
        ArrayStyle::HorizontalTable => ContainerKind::TableCol,
    };

    let column_count = if kind != ContainerKind::List && template.kind == PropertyKind::Array {
        let first_row = data
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_array)
            .map(|r| r.len());
        Some(first_row.unwrap_or_else(|| initial_item_count(&template, None)))
    } else {
        None
    };

    let mut container = ArrayContainer {
        kind,
        min_items: schema.min_items.unwrap_or(0),
        max_items: schema.max_items,
        is_required: required,
        template: Arc::new(template),
        column_count,
        controls: Default::default(),
    };
    container.controls = container.compute_controls(initial_item_count(schema, data));
    Ok(container)
}

fn field_for(schema: &PropertySchema, data: Option<&Value>, required: bool) -> Field {
    let kind = FieldKind::from_schema(schema).unwrap_or(FieldKind::Text);
    let (value, units) = initial_value(kind, data);
    let units = units.or_else(|| schema.units.first().cloned());
    Field {
        kind,
        value,
        units: if kind == FieldKind::Quantity { units } else { None },
        disabled: false,
        constraints: FieldConstraints {
            required,
            min_length: schema.min_length,
            max_length: schema.max_length,
            minimum: schema.minimum,
            maximum: schema.maximum,
            choices: schema.choices.clone(),
            units: schema.units.clone(),
        },
    }
}

fn initial_value(kind: FieldKind, data: Option<&Value>) -> (String, Option<String>) {
    let Some(v) = data else {
        let empty = if kind == FieldKind::Bool { "false" } else { "" };
        return (empty.to_string(), None);
    };
    match (kind, v) {
        (FieldKind::Quantity, Value::Object(o)) => (
            o.get("magnitude").map(scalar_text).unwrap_or_default(),
            o.get("units").and_then(Value::as_str).map(str::to_string),
        ),
        (FieldKind::Bool, Value::Bool(b)) => (b.to_string(), None),
        (FieldKind::Bool, _) => ("false".to_string(), None),
        (_, other) => (scalar_text(other), None),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
