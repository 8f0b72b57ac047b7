//! Item renumbering.
//!
//! Items are moved in two passes: every item that changes index is first
//! lifted out of the tree into a staging area, then reinserted under its new
//! index. Nothing is written while any old key is still live, so a move never
//! overwrites a sibling mid-way.

use crate::path::{FieldIndex, FieldPath};
use crate::tree::{FieldTree, Node, WrapperRegion};

/// One lifted item: its old index plus the nodes and regions below it.
struct Staged {
    from: usize,
    nodes: Vec<(FieldPath, Node)>,
    regions: Vec<(FieldPath, WrapperRegion)>,
}

/// Rearrange the items of `container` so that the item currently at
/// `order[k]` ends up at index `k`.
///
/// `order` must list existing indices without repeats. Items not listed are
/// left untouched, which callers use after removing an item. Returns the
/// `(old_root, new_root)` pairs of items that actually moved.
pub fn reorder(tree: &mut FieldTree, container: &FieldPath, order: &[usize]) -> Vec<(FieldPath, FieldPath)> {
    let pos = container.len();

    let mut staged = Vec::new();
    for (to, &from) in order.iter().enumerate() {
        if to == from {
            continue;
        }
        let (nodes, regions) = tree.take_subtree(&container.item(from));
        staged.push((to, Staged { from, nodes, regions }));
    }

    let mut moves = Vec::with_capacity(staged.len());
    for (to, item) in staged {
        for (path, node) in item.nodes {
            let path = path.with_index_at(pos, to).unwrap_or(path);
            tree.insert(path, node);
        }
        for (path, region) in item.regions {
            let path = path.with_index_at(pos, to).unwrap_or(path);
            tree.put_region(path, region);
        }
        moves.push((container.item(item.from), container.item(to)));
    }
    moves
}

/// Remove item `index` and close the gap. Returns the moves of the items that
/// followed it.
pub fn remove_and_compact(tree: &mut FieldTree, container: &FieldPath, index: usize) -> Vec<(FieldPath, FieldPath)> {
    let indices = tree.item_indices(container);
    let _ = tree.take_subtree(&container.item(index));
    let remaining: Vec<usize> = indices.into_iter().filter(|&i| i != index).collect();
    reorder(tree, container, &remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::FormSchema;
    use crate::tree::render_form;
    use serde_json::json;

    fn tree(n: usize) -> FieldTree {
        let schema = FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "rows": {"type": "array", "items": {"type": "object", "properties": {
                    "value": {"type": "text"},
                    "note": {"type": "text", "conditions": [{"type": "literal", "value": true}]}
                }}}
            }
        }))
        .unwrap();
        let rows: Vec<_> = (0..n).map(|i| json!({"value": i.to_string()})).collect();
        render_form(&schema, Some(&json!({ "rows": rows })), &EngineConfig::default()).unwrap()
    }

    fn value(t: &FieldTree, i: usize) -> String {
        t.field(&FieldPath::root().child("rows").item(i).child("value"))
            .unwrap()
            .value
            .clone()
    }

    #[test]
    fn remove_closes_gap() {
        let mut t = tree(4);
        let rows = FieldPath::root().child("rows");
        let moves = remove_and_compact(&mut t, &rows, 1);
        assert_eq!(t.item_indices(&rows), vec![0, 1, 2]);
        assert_eq!((value(&t, 0), value(&t, 1), value(&t, 2)), ("0".to_string(), "2".to_string(), "3".to_string()));
        assert_eq!(moves, vec![(rows.item(2), rows.item(1)), (rows.item(3), rows.item(2))]);
        assert!(t.region(&rows.item(2).child("note")).is_some());
        assert!(t.region(&rows.item(3).child("note")).is_none());
    }

    #[test]
    fn reorder_swaps_without_collisions() {
        let mut t = tree(3);
        let rows = FieldPath::root().child("rows");
        reorder(&mut t, &rows, &[2, 0, 1]);
        assert_eq!((value(&t, 0), value(&t, 1), value(&t, 2)), ("2".to_string(), "0".to_string(), "1".to_string()));
        assert_eq!(t.item_count(&rows), 3);
    }
}
