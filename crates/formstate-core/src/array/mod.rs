//! Repeatable groups: structural operations on array containers.
//!
//! Rules:
//! - item indices of every container stay contiguous and zero-based after each
//!   operation
//! - an operation whose control is disabled is rejected without touching the
//!   tree (disabled buttons cannot be pressed)
//! - every applied operation returns a [`RegistryDiff`] naming the item roots
//!   that disappeared, moved or appeared, so the caller can re-register
//!   conditions and calculations for exactly those subtrees
//! - control state is recomputed before returning
//!
//! Column operations apply to tables whose items are themselves arrays: the
//! operation runs on every row at once and updates the shared column count.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::errors::{FormError, FormResult};
use crate::path::{FieldIndex, FieldPath};
use crate::tree::{render_subtree, ContainerKind, FieldTree};

pub mod renumber;

pub use renumber::{remove_and_compact, reorder};

/// A structural operation on one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayOp {
    AddItem,
    DeleteItem(usize),
    CopyRow(usize),
    Clear,
    AddColumn,
    DeleteColumn(usize),
}

impl ArrayOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddItem => "add_item",
            Self::DeleteItem(_) => "delete_item",
            Self::CopyRow(_) => "copy_row",
            Self::Clear => "clear",
            Self::AddColumn => "add_column",
            Self::DeleteColumn(_) => "delete_column",
        }
    }
}

/// Item roots affected by one structural operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDiff {
    pub container: FieldPath,
    /// Items whose content no longer exists.
    pub dropped: Vec<FieldPath>,
    /// Items that changed index, as `(old_root, new_root)`.
    pub moved: Vec<(FieldPath, FieldPath)>,
    /// Items rendered by this operation.
    pub created: Vec<FieldPath>,
}

impl RegistryDiff {
    fn new(container: &FieldPath) -> Self {
        Self {
            container: container.clone(),
            ..Self::default()
        }
    }

    /// Roots whose registrations must be dropped.
    pub fn removed_roots(&self) -> Vec<FieldPath> {
        self.dropped
            .iter()
            .cloned()
            .chain(self.moved.iter().map(|(from, _)| from.clone()))
            .collect()
    }

    /// Roots whose registrations must be (re)created.
    pub fn added_roots(&self) -> Vec<FieldPath> {
        self.moved
            .iter()
            .map(|(_, to)| to.clone())
            .chain(self.created.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.moved.is_empty() && self.created.is_empty()
    }

    fn absorb(&mut self, other: RegistryDiff) {
        self.dropped.extend(other.dropped);
        self.moved.extend(other.moved);
        self.created.extend(other.created);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayOutcome {
    Applied(RegistryDiff),
    /// The control for this operation is disabled; nothing changed.
    Rejected(String),
}

/// Run `op` on the container at `container`.
///
/// Errors only for addressing mistakes: an unknown container, or an item or
/// column index that does not exist.
pub fn apply(tree: &mut FieldTree, container: &FieldPath, op: ArrayOp, config: &EngineConfig) -> FormResult<ArrayOutcome> {
    let c = tree
        .container(container)
        .ok_or_else(|| FormError::UnknownContainer(container.to_string()))?;
    let controls = c.controls;
    let kind = c.kind;
    let columns = c.column_count;
    let count = tree.item_count(container);

    let rejected = |why: &str| -> FormResult<ArrayOutcome> {
        debug!(container = %container, op = op.as_str(), reason = why, "array operation rejected");
        Ok(ArrayOutcome::Rejected(format!("{}: {why}", op.as_str())))
    };

    let diff = match op {
        ArrayOp::AddItem => {
            if !controls.add {
                return rejected("maximum number of items reached");
            }
            add_item(tree, container, count, columns, config)?
        }
        ArrayOp::DeleteItem(index) => {
            require_item(container, index, count)?;
            if !controls.delete {
                return rejected("minimum number of items reached");
            }
            delete_item(tree, container, index)
        }
        ArrayOp::CopyRow(index) => {
            require_item(container, index, count)?;
            if kind != ContainerKind::TableRow {
                return rejected("only table rows can be copied");
            }
            if !controls.copy {
                return rejected("maximum number of items reached");
            }
            copy_row(tree, container, index, count)
        }
        ArrayOp::Clear => {
            if !controls.delete {
                return rejected("no item can be deleted");
            }
            clear(tree, container)
        }
        ArrayOp::AddColumn => {
            let Some(cols) = columns else {
                return rejected("container has no columns");
            };
            if !controls.add_column {
                return rejected("maximum number of columns reached");
            }
            add_column(tree, container, cols, config)?
        }
        ArrayOp::DeleteColumn(column) => {
            let Some(cols) = columns else {
                return rejected("container has no columns");
            };
            if column >= cols {
                return Err(FormError::invalid_argument(format!(
                    "{container}: column {column} out of range (0..{cols})"
                )));
            }
            if !controls.delete_column {
                return rejected("minimum number of columns reached");
            }
            delete_column(tree, container, column)
        }
    };

    info!(
        container = %container,
        op = op.as_str(),
        dropped = diff.dropped.len(),
        moved = diff.moved.len(),
        created = diff.created.len(),
        "array operation applied"
    );
    Ok(ArrayOutcome::Applied(diff))
}

fn require_item(container: &FieldPath, index: usize, count: usize) -> FormResult<()> {
    if index >= count {
        return Err(FormError::UnknownField(container.item(index).to_string()));
    }
    Ok(())
}

/// Recompute control state of `container`, and of its rows when it is a
/// table of arrays.
pub fn refresh_controls(tree: &mut FieldTree, container: &FieldPath) {
    let count = tree.item_count(container);
    let has_columns = match tree.container_mut(container) {
        Some(c) => {
            c.controls = c.compute_controls(count);
            c.column_count.is_some()
        }
        None => return,
    };
    if has_columns {
        for row in tree.item_indices(container) {
            let row = container.item(row);
            let cols = tree.item_count(&row);
            if let Some(inner) = tree.container_mut(&row) {
                inner.controls = inner.compute_controls(cols);
            }
        }
    }
}

fn render_item(
    tree: &mut FieldTree,
    container: &FieldPath,
    index: usize,
    columns: Option<usize>,
    config: &EngineConfig,
) -> FormResult<FieldPath> {
    let template = tree
        .container(container)
        .map(|c| c.template.clone())
        .ok_or_else(|| FormError::UnknownContainer(container.to_string()))?;
    let data = columns.map(|cols| Value::Array(vec![Value::Null; cols]));
    let root = container.item(index);
    render_subtree(tree, &root, &template, data.as_ref(), !template.kind.is_leaf(), config)?;
    Ok(root)
}

fn add_item(
    tree: &mut FieldTree,
    container: &FieldPath,
    count: usize,
    columns: Option<usize>,
    config: &EngineConfig,
) -> FormResult<RegistryDiff> {
    let mut diff = RegistryDiff::new(container);
    diff.created.push(render_item(tree, container, count, columns, config)?);
    refresh_controls(tree, container);
    Ok(diff)
}

fn delete_item(tree: &mut FieldTree, container: &FieldPath, index: usize) -> RegistryDiff {
    let mut diff = RegistryDiff::new(container);
    diff.moved = remove_and_compact(tree, container, index);
    diff.dropped.push(container.item(index));
    refresh_controls(tree, container);
    diff
}

/// Duplicate row `source` (values, units and nested items alike) as a new
/// last row, then move it right after `source`.
fn copy_row(tree: &mut FieldTree, container: &FieldPath, source: usize, count: usize) -> RegistryDiff {
    let fresh = container.item(count);
    tree.copy_subtree(&container.item(source), count);

    let order: Vec<usize> = (0..=source)
        .chain(std::iter::once(count))
        .chain(source + 1..count)
        .collect();
    let moves = reorder(tree, container, &order);

    let mut diff = RegistryDiff::new(container);
    diff.created.push(container.item(source + 1));
    diff.moved = moves.into_iter().filter(|(from, _)| *from != fresh).collect();
    refresh_controls(tree, container);
    diff
}

/// Delete from the end while the delete control stays enabled.
fn clear(tree: &mut FieldTree, container: &FieldPath) -> RegistryDiff {
    let mut diff = RegistryDiff::new(container);
    loop {
        let count = tree.item_count(container);
        let can_delete = tree.container(container).is_some_and(|c| c.controls.delete);
        if count == 0 || !can_delete {
            break;
        }
        diff.absorb(delete_item(tree, container, count - 1));
    }
    diff
}

fn add_column(tree: &mut FieldTree, container: &FieldPath, cols: usize, config: &EngineConfig) -> FormResult<RegistryDiff> {
    let mut diff = RegistryDiff::new(container);
    for row in tree.item_indices(container) {
        let row = container.item(row);
        let cells = tree.item_count(&row);
        diff.created.push(render_item(tree, &row, cells, None, config)?);
    }
    if let Some(c) = tree.container_mut(container) {
        c.column_count = Some(cols + 1);
    }
    refresh_controls(tree, container);
    Ok(diff)
}

fn delete_column(tree: &mut FieldTree, container: &FieldPath, column: usize) -> RegistryDiff {
    let mut diff = RegistryDiff::new(container);
    for row in tree.item_indices(container) {
        let row = container.item(row);
        if tree.item_count(&row) <= column {
            continue;
        }
        diff.moved.extend(remove_and_compact(tree, &row, column));
        diff.dropped.push(row.item(column));
    }
    if let Some(c) = tree.container_mut(container) {
        c.column_count = c.column_count.map(|n| n.saturating_sub(1));
    }
    refresh_controls(tree, container);
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FormSchema;
    use crate::tree::render_form;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn rows_tree() -> FieldTree {
        let schema = FormSchema::from_value(json!({
            "type": "object",
            "required": ["rows"],
            "properties": {
                "rows": {
                    "type": "array", "style": "table", "minItems": 1, "maxItems": 3,
                    "items": {"type": "object", "properties": {
                        "name": {"type": "text"},
                        "mass": {"type": "quantity", "units": ["g", "kg"]}
                    }}
                }
            }
        }))
        .unwrap();
        render_form(&schema, None, &EngineConfig::default()).unwrap()
    }

    fn rows() -> FieldPath {
        FieldPath::root().child("rows")
    }

    fn run(tree: &mut FieldTree, op: ArrayOp) -> ArrayOutcome {
        apply(tree, &rows(), op, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn button_states_follow_bounds() {
        let mut t = rows_tree();
        let controls = |t: &FieldTree| t.container(&rows()).unwrap().controls;
        assert!(controls(&t).add && !controls(&t).delete);

        run(&mut t, ArrayOp::AddItem);
        assert!(controls(&t).add && controls(&t).delete);

        run(&mut t, ArrayOp::AddItem);
        assert!(!controls(&t).add && controls(&t).delete);
        assert_matches!(run(&mut t, ArrayOp::AddItem), ArrayOutcome::Rejected(_));
        assert_eq!(t.item_count(&rows()), 3);
    }

    #[test]
    fn delete_reports_moves() {
        let mut t = rows_tree();
        run(&mut t, ArrayOp::AddItem);
        run(&mut t, ArrayOp::AddItem);
        t.field_mut(&rows().item(2).child("name")).unwrap().value = "last".into();

        let diff = match run(&mut t, ArrayOp::DeleteItem(0)) {
            ArrayOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(diff.dropped, vec![rows().item(0)]);
        assert_eq!(diff.moved.len(), 2);
        assert_eq!(t.item_indices(&rows()), vec![0, 1]);
        assert_eq!(t.field(&rows().item(1).child("name")).unwrap().value, "last");
    }

    #[test]
    fn copy_places_clone_after_source() {
        let mut t = rows_tree();
        run(&mut t, ArrayOp::AddItem);
        let mass = rows().item(0).child("mass");
        t.field_mut(&mass).unwrap().value = "5".into();
        t.field_mut(&mass).unwrap().units = Some("kg".into());
        t.field_mut(&rows().item(1).child("name")).unwrap().value = "second".into();

        let diff = match run(&mut t, ArrayOp::CopyRow(0)) {
            ArrayOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(diff.created, vec![rows().item(1)]);
        assert_eq!(diff.moved, vec![(rows().item(1), rows().item(2))]);

        let copy = t.field(&rows().item(1).child("mass")).unwrap();
        assert_eq!((copy.value.as_str(), copy.units.as_deref()), ("5", Some("kg")));
        assert_eq!(t.field(&rows().item(2).child("name")).unwrap().value, "second");
    }

    #[test]
    fn copy_keeps_nested_items() {
        let schema = FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "rows": {
                    "type": "array", "style": "table",
                    "items": {"type": "object", "properties": {
                        "tags": {"type": "array", "defaultItems": 1, "items": {"type": "text"}}
                    }}
                }
            }
        }))
        .unwrap();
        let cfg = EngineConfig::default();
        let data = json!({"rows": [{"tags": ["x", "y", "z"]}, {"tags": ["w"]}]});
        let mut t = render_form(&schema, Some(&data), &cfg).unwrap();

        assert_matches!(apply(&mut t, &rows(), ArrayOp::CopyRow(0), &cfg).unwrap(), ArrayOutcome::Applied(_));
        let tags = rows().item(1).child("tags");
        assert_eq!(t.item_indices(&tags), vec![0, 1, 2]);
        let values: Vec<_> = (0..3).map(|i| t.field(&tags.item(i)).unwrap().value.clone()).collect();
        assert_eq!(values, ["x", "y", "z"]);
        assert_eq!(t.container(&tags).unwrap().controls, t.container(&rows().item(0).child("tags")).unwrap().controls);
        assert_eq!(t.item_indices(&rows().item(2).child("tags")), vec![0]);
    }

    #[test]
    fn clear_stops_at_floor() {
        let mut t = rows_tree();
        run(&mut t, ArrayOp::AddItem);
        run(&mut t, ArrayOp::AddItem);
        let diff = match run(&mut t, ArrayOp::Clear) {
            ArrayOutcome::Applied(d) => d,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(diff.dropped, vec![rows().item(2), rows().item(1)]);
        assert_eq!(t.item_count(&rows()), 1);
        assert_matches!(run(&mut t, ArrayOp::Clear), ArrayOutcome::Rejected(_));
    }

    #[test]
    fn addressing_errors() {
        let mut t = rows_tree();
        assert!(apply(&mut t, &FieldPath::root().child("nope"), ArrayOp::AddItem, &EngineConfig::default()).is_err());
        assert!(apply(&mut t, &rows(), ArrayOp::DeleteItem(5), &EngineConfig::default()).is_err());
    }

    #[test]
    fn columns_span_every_row() {
        let schema = FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "grid": {
                    "type": "array", "style": "table", "defaultItems": 2,
                    "items": {"type": "array", "defaultItems": 2, "maxItems": 3, "minItems": 1, "items": {"type": "text"}}
                }
            }
        }))
        .unwrap();
        let cfg = EngineConfig::default();
        let mut t = render_form(&schema, None, &cfg).unwrap();
        let grid = FieldPath::root().child("grid");

        assert_matches!(apply(&mut t, &grid, ArrayOp::AddColumn, &cfg).unwrap(), ArrayOutcome::Applied(_));
        assert_eq!(t.container(&grid).unwrap().column_count, Some(3));
        assert_eq!(t.item_count(&grid.item(0)), 3);
        assert_eq!(t.item_count(&grid.item(1)), 3);
        assert!(!t.container(&grid).unwrap().controls.add_column);

        // New rows get the current column count.
        apply(&mut t, &grid, ArrayOp::AddItem, &cfg).unwrap();
        assert_eq!(t.item_count(&grid.item(2)), 3);

        t.field_mut(&grid.item(0).item(2)).unwrap().value = "z".into();
        apply(&mut t, &grid, ArrayOp::DeleteColumn(1), &cfg).unwrap();
        assert_eq!(t.container(&grid).unwrap().column_count, Some(2));
        assert_eq!(t.item_indices(&grid.item(0)), vec![0, 1]);
        assert_eq!(t.field(&grid.item(0).item(1)).unwrap().value, "z");
    }
}
