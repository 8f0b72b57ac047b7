//! Relative path resolution against the rendered tree.
//!
//! `resolve(index, base, rel)` turns a relative path plus the base prefix of
//! the object that declares it into the absolute field paths that currently
//! exist. Resolution never fails: a path that matches nothing yields an empty
//! result and the caller treats its inputs as unavailable.

use crate::path::{FieldPath, RelSegment, RelativePath, Segment};

/// Read-only view of the rendered tree needed for resolution.
pub trait FieldIndex {
    /// True if a leaf input exists at `path`.
    fn has_field(&self, path: &FieldPath) -> bool;

    /// Item indices currently present in the container at `path`, ascending.
    /// Empty when `path` is not a container.
    fn item_indices(&self, path: &FieldPath) -> Vec<usize>;
}

/// Result of resolving one relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Existing fields matched, in expansion order, without duplicates.
    pub fields: Vec<FieldPath>,
    /// Containers enumerated by a `*` segment. A structural change to any of
    /// them changes this resolution.
    pub expanded: Vec<FieldPath>,
    /// Every concrete path reached, whether or not a field exists there.
    pub candidates: Vec<FieldPath>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone)]
struct Branch {
    path: FieldPath,
    popped_index: Option<usize>,
}

/// Resolve `rel` against `base`, the path of the object declaring it.
///
/// Segments apply left to right:
/// - a name or index descends into that child
/// - `*` branches into every item currently in the container reached so far
/// - `..` pops the trailing segment, whether a name or an index, and fails
///   the branch at the root
/// - `+N`/`-N` applies only directly after a `..` that popped an index, and
///   descends into that index shifted by N; after a `..` that popped a name,
///   or anywhere else, the branch is unresolvable, as is a shift below zero
///
/// Unresolvable branches are dropped. Every concrete path reached lands in
/// [`Resolution::candidates`]; the ones holding a field land in `fields`.
pub fn resolve<I: FieldIndex + ?Sized>(index: &I, base: &FieldPath, rel: &RelativePath) -> Resolution {
    let mut out = Resolution::default();
    let mut branches = vec![Branch {
        path: base.clone(),
        popped_index: None,
    }];

    for seg in rel.segments() {
        let mut next = Vec::with_capacity(branches.len());
        for mut b in branches {
            match seg {
                RelSegment::Name(n) => {
                    b.path.push(Segment::Name(n.clone()));
                    b.popped_index = None;
                    next.push(b);
                }
                RelSegment::Index(i) => {
                    b.path.push(Segment::Index(*i));
                    b.popped_index = None;
                    next.push(b);
                }
                RelSegment::Parent => {
                    if let Some(popped) = b.path.pop() {
                        b.popped_index = popped.as_index();
                        next.push(b);
                    }
                }
                RelSegment::Offset(delta) => {
                    let Some(popped) = b.popped_index else {
                        continue;
                    };
                    let target = popped as i64 + delta;
                    if target >= 0 {
                        b.path.push(Segment::Index(target as usize));
                        b.popped_index = None;
                        next.push(b);
                    }
                }
                RelSegment::Wildcard => {
                    if !out.expanded.contains(&b.path) {
                        out.expanded.push(b.path.clone());
                    }
                    for i in index.item_indices(&b.path) {
                        next.push(Branch {
                            path: b.path.item(i),
                            popped_index: None,
                        });
                    }
                }
            }
        }
        branches = next;
        if branches.is_empty() {
            break;
        }
    }

    for b in branches {
        if out.candidates.contains(&b.path) {
            continue;
        }
        if index.has_field(&b.path) {
            out.fields.push(b.path.clone());
        }
        out.candidates.push(b.path);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    struct Fixture {
        fields: BTreeSet<FieldPath>,
    }

    impl FieldIndex for Fixture {
        fn has_field(&self, path: &FieldPath) -> bool {
            self.fields.contains(path)
        }

        fn item_indices(&self, path: &FieldPath) -> Vec<usize> {
            let mut out: Vec<usize> = self
                .fields
                .iter()
                .filter(|f| f.len() > path.len() && f.starts_with(path))
                .filter_map(|f| f.segments()[path.len()].as_index())
                .collect();
            out.dedup();
            out
        }
    }

    fn rows(n: usize) -> Fixture {
        let root = FieldPath::root().child("rows");
        let mut fields = BTreeSet::new();
        for i in 0..n {
            fields.insert(root.item(i).child("value"));
        }
        fields.insert(FieldPath::root().child("total"));
        Fixture { fields }
    }

    #[test]
    fn sibling_property_resolves() {
        let fx = rows(2);
        let r = resolve(&fx, &FieldPath::root(), &RelativePath::parse("total").unwrap());
        assert_eq!(r.fields, vec![FieldPath::root().child("total")]);
    }

    #[test]
    fn wildcard_expands_every_item() {
        let fx = rows(3);
        let r = resolve(&fx, &FieldPath::root(), &RelativePath::parse("rows.*.value").unwrap());
        assert_eq!(r.fields.len(), 3);
        assert_eq!(r.expanded, vec![FieldPath::root().child("rows")]);
    }

    #[test]
    fn offset_references_previous_row() {
        let fx = rows(3);
        let base = FieldPath::root().child("rows").item(2);
        let rel: RelativePath = serde_json::from_str(r#"["..", "-1", "value"]"#).unwrap();
        let r = resolve(&fx, &base, &rel);
        assert_eq!(r.fields, vec![FieldPath::root().child("rows").item(1).child("value")]);
    }

    #[test]
    fn offset_before_first_row_is_unavailable() {
        let fx = rows(3);
        let base = FieldPath::root().child("rows").item(0);
        let rel: RelativePath = serde_json::from_str(r#"["..", "-1", "value"]"#).unwrap();
        assert!(resolve(&fx, &base, &rel).is_empty());
    }

    #[test]
    fn missing_row_is_still_a_candidate() {
        let fx = rows(2);
        let base = FieldPath::root().child("rows").item(1);
        let rel: RelativePath = serde_json::from_str(r#"["..", "+1", "value"]"#).unwrap();
        let r = resolve(&fx, &base, &rel);
        assert!(r.is_empty());
        assert_eq!(r.candidates, vec![FieldPath::root().child("rows").item(2).child("value")]);
    }

    #[test]
    fn ascending_past_root_is_unavailable() {
        let fx = rows(1);
        let rel: RelativePath = serde_json::from_str(r#"["..", "total"]"#).unwrap();
        assert!(resolve(&fx, &FieldPath::root(), &rel).is_empty());
    }

    #[test]
    fn offset_after_popping_a_name_is_unavailable() {
        let fx = rows(2);
        let base = FieldPath::root().child("rows").item(0);

        let up: RelativePath = serde_json::from_str(r#"["..", "..", "total"]"#).unwrap();
        assert_eq!(resolve(&fx, &base, &up).fields, vec![FieldPath::root().child("total")]);

        let shifted: RelativePath = serde_json::from_str(r#"["..", "..", "+1"]"#).unwrap();
        let r = resolve(&fx, &base, &shifted);
        assert!(r.is_empty());
        assert!(r.candidates.is_empty());
    }

    #[test]
    fn offset_without_popped_index_is_unavailable() {
        let fx = rows(2);
        let rel: RelativePath = serde_json::from_str(r#"["+1", "value"]"#).unwrap();
        assert!(resolve(&fx, &FieldPath::root().child("rows"), &rel).is_empty());
    }
}
