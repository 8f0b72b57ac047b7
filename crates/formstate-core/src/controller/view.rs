//! Serializable read-only view of a form, for printing and API payloads.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::controller::FormState;
use crate::path::FieldIndex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub id: String,
    pub kind: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerView {
    pub id: String,
    pub kind: &'static str,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    pub add: bool,
    pub delete: bool,
    pub copy: bool,
    pub add_column: bool,
    pub delete_column: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSnapshot {
    pub fields: Vec<FieldView>,
    pub containers: Vec<ContainerView>,
    pub errors: usize,
}

pub fn snapshot(state: &FormState, config: &EngineConfig) -> FormSnapshot {
    let root = config.ids.root_prefix.as_str();

    let fields = state
        .tree
        .fields()
        .map(|(path, f)| FieldView {
            id: path.to_identifier(root),
            kind: f.kind.as_str(),
            value: f.value.clone(),
            units: f.units.clone(),
            enabled: !f.disabled,
            error: state.errors.get(path).map(|e| e.message.clone()),
            suggestion: state.calculations.suggestion(path).map(|s| s.value.clone()),
        })
        .collect();

    let containers = state
        .tree
        .containers()
        .map(|(path, c)| ContainerView {
            id: path.to_identifier(root),
            kind: c.kind.as_str(),
            items: state.tree.item_indices(path).len(),
            columns: c.column_count,
            add: c.controls.add,
            delete: c.controls.delete,
            copy: c.controls.copy,
            add_column: c.controls.add_column,
            delete_column: c.controls.delete_column,
        })
        .collect();

    FormSnapshot {
        fields,
        containers,
        errors: state.errors.len(),
    }
}
