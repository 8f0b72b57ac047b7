//! Conditional visibility.
//!
//! Each property with conditions owns a wrapper region. The evaluator keeps one
//! [`ConditionWrapperState`] per registered wrapper: one boolean per top-level
//! condition, each with the set of field paths it read. A field change only
//! recomputes the top-level conditions that read it; the wrapper is visible
//! when all of them hold.
//!
//! Per wrapper the lifecycle is `Unregistered -> Visible <-> Hidden`. A hidden
//! wrapper disables every field below it (not merely hides it), so that
//! calculations and other conditions stop counting those fields. The fields
//! whose disabled flag flips are returned to the caller, which turns them into
//! change notifications.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::path::{resolve, FieldPath};
use crate::schema::{ConditionNode, EqualsKind, Expected};
use crate::tree::{Field, FieldTree};

/// Observable phase of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperPhase {
    Unregistered,
    Visible,
    Hidden,
}

/// Result of one top-level condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionResult {
    pub value: bool,
    /// Field paths (existing or not) this condition read.
    pub deps: BTreeSet<FieldPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionWrapperState {
    pub results: Vec<ConditionResult>,
    pub visible: bool,
}

impl ConditionWrapperState {
    fn combined(&self) -> bool {
        self.results.iter().all(|r| r.value)
    }

    fn reads(&self, field: &FieldPath) -> bool {
        self.results.iter().any(|r| r.deps.contains(field))
    }
}

/// Evaluate one condition tree against the tree.
///
/// Every child of `All`/`Any` is evaluated (no short-circuit) so that `deps`
/// always collects every referenced path.
pub fn evaluate_node(
    tree: &FieldTree,
    base: &FieldPath,
    node: &ConditionNode,
    deps: &mut BTreeSet<FieldPath>,
) -> bool {
    match node {
        ConditionNode::Literal(b) => *b,
        ConditionNode::Not(inner) => !evaluate_node(tree, base, inner, deps),
        ConditionNode::All(children) => children
            .iter()
            .map(|c| evaluate_node(tree, base, c, deps))
            .fold(true, |acc, v| acc && v),
        ConditionNode::Any(children) => children
            .iter()
            .map(|c| evaluate_node(tree, base, c, deps))
            .fold(false, |acc, v| acc || v),
        ConditionNode::Equals {
            kind,
            path,
            expected,
        } => {
            let resolution = resolve(tree, base, path);
            deps.extend(resolution.candidates.iter().cloned());
            deps.extend(resolution.expanded.iter().cloned());
            resolution
                .fields
                .iter()
                .filter_map(|p| tree.field(p))
                .any(|f| field_equals(f, *kind, expected))
        }
    }
}

/// A disabled field never satisfies an `Equals` node.
fn field_equals(field: &Field, kind: EqualsKind, expected: &Expected) -> bool {
    if field.disabled {
        return false;
    }
    let value = field.value.trim();
    match (kind, expected) {
        (EqualsKind::Choice, Expected::Text(choice)) => value == choice,
        (EqualsKind::Bool, Expected::Bool(b)) => (value == "true") == *b,
        (EqualsKind::User | EqualsKind::Object, Expected::Id(None)) => value.is_empty(),
        (EqualsKind::User | EqualsKind::Object, Expected::Id(Some(id))) => {
            value.parse::<i64>().ok() == Some(*id)
        }
        _ => false,
    }
}

/// Registry of wrapper states, keyed by wrapper path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionEvaluator {
    states: BTreeMap<FieldPath, ConditionWrapperState>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn phase(&self, wrapper: &FieldPath) -> WrapperPhase {
        match self.states.get(wrapper) {
            None => WrapperPhase::Unregistered,
            Some(s) if s.visible => WrapperPhase::Visible,
            Some(_) => WrapperPhase::Hidden,
        }
    }

    pub fn state(&self, wrapper: &FieldPath) -> Option<&ConditionWrapperState> {
        self.states.get(wrapper)
    }

    pub fn wrappers(&self) -> impl Iterator<Item = &FieldPath> {
        self.states.keys()
    }

    /// Register (or re-register) the wrapper at `wrapper`, evaluating every
    /// top-level condition. Returns fields whose disabled flag flipped.
    pub fn register(&mut self, tree: &mut FieldTree, wrapper: &FieldPath) -> Vec<FieldPath> {
        let Some(node) = tree.node(wrapper) else {
            return Vec::new();
        };
        let base = wrapper.parent().unwrap_or_default();
        let results: Vec<ConditionResult> = node
            .conditions
            .iter()
            .map(|c| {
                let mut deps = BTreeSet::new();
                let value = evaluate_node(tree, &base, c, &mut deps);
                ConditionResult { value, deps }
            })
            .collect();

        let mut state = ConditionWrapperState {
            results,
            visible: true,
        };
        state.visible = state.combined();
        debug!(wrapper = %wrapper, visible = state.visible, "registered condition wrapper");
        self.states.insert(wrapper.clone(), state);
        apply(tree, wrapper, self.states[wrapper].visible)
    }

    /// Drop every wrapper state at or below `prefix`.
    pub fn unregister_subtree(&mut self, prefix: &FieldPath) {
        self.states.retain(|p, _| !p.starts_with(prefix));
    }

    /// Wrappers with at least one condition reading `field`.
    pub fn dependents_of(&self, field: &FieldPath) -> Vec<FieldPath> {
        self.states
            .iter()
            .filter(|(_, s)| s.reads(field))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Wrappers reading anything at or below one of `roots`.
    pub fn touching(&self, roots: &BTreeSet<FieldPath>) -> Vec<FieldPath> {
        self.states
            .iter()
            .filter(|(_, s)| {
                s.results
                    .iter()
                    .flat_map(|r| r.deps.iter())
                    .any(|d| roots.iter().any(|root| d.starts_with(root) || root.starts_with(d)))
            })
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Recompute the top-level conditions of `wrapper` that read `field` and
    /// toggle the region if the combined result changed.
    pub fn on_field_changed(&mut self, tree: &mut FieldTree, wrapper: &FieldPath, field: &FieldPath) -> Vec<FieldPath> {
        let Some(node) = tree.node(wrapper) else {
            return Vec::new();
        };
        let Some(state) = self.states.get_mut(wrapper) else {
            return Vec::new();
        };
        let base = wrapper.parent().unwrap_or_default();
        for (i, cond) in node.conditions.iter().enumerate() {
            let Some(slot) = state.results.get_mut(i) else {
                continue;
            };
            if slot.deps.contains(field) {
                let mut deps = BTreeSet::new();
                slot.value = evaluate_node(tree, &base, cond, &mut deps);
                slot.deps = deps;
            }
        }

        let visible = state.combined();
        if visible == state.visible {
            trace!(wrapper = %wrapper, "condition result unchanged");
            return Vec::new();
        }
        state.visible = visible;
        debug!(wrapper = %wrapper, visible, "condition wrapper toggled");
        apply(tree, wrapper, visible)
    }
}

fn apply(tree: &mut FieldTree, wrapper: &FieldPath, visible: bool) -> Vec<FieldPath> {
    if let Some(region) = tree.region_mut(wrapper) {
        region.visible = visible;
        region.replacement_visible = !visible;
    }
    tree.refresh_disabled(wrapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::FormSchema;
    use crate::tree::render_form;
    use serde_json::json;

    fn cond(v: serde_json::Value) -> ConditionNode {
        serde_json::from_value(v).unwrap()
    }

    fn tree_with(data: serde_json::Value) -> FieldTree {
        let schema = FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "kind": {"type": "text", "choices": ["solid", "liquid"]},
                "dry": {"type": "bool"},
                "owner": {"type": "user"},
                "volume": {
                    "type": "quantity",
                    "conditions": [{"type": "choice_equals", "property_name": "kind", "choice": "liquid"}]
                }
            }
        }))
        .unwrap();
        render_form(&schema, Some(&data), &EngineConfig::default()).unwrap()
    }

    fn eval(tree: &FieldTree, node: serde_json::Value) -> bool {
        evaluate_node(tree, &FieldPath::root(), &cond(node), &mut BTreeSet::new())
    }

    #[test]
    fn truth_table_basics() {
        let tree = tree_with(json!({}));
        assert!(eval(&tree, json!({"type": "all", "conditions": []})));
        assert!(!eval(&tree, json!({"type": "any", "conditions": []})));
        for x in [true, false] {
            let inner = json!({"type": "literal", "value": x});
            let nn = json!({"type": "not", "condition": {"type": "not", "condition": inner.clone()}});
            assert_eq!(eval(&tree, nn), eval(&tree, inner));
        }
    }

    #[test]
    fn equals_kinds() {
        let tree = tree_with(json!({"kind": "liquid", "dry": true, "owner": 7}));
        assert!(eval(&tree, json!({"type": "choice_equals", "property_name": "kind", "choice": "liquid"})));
        assert!(eval(&tree, json!({"type": "bool_equals", "property_name": "dry", "value": true})));
        assert!(eval(&tree, json!({"type": "user_equals", "property_name": "owner", "user_id": 7})));
        assert!(!eval(&tree, json!({"type": "user_equals", "property_name": "owner"})));
        assert!(!eval(&tree, json!({"type": "choice_equals", "property_name": "missing", "choice": "x"})));
    }

    #[test]
    fn disabled_field_never_equals() {
        let mut tree = tree_with(json!({"kind": "liquid"}));
        tree.field_mut(&FieldPath::root().child("kind")).unwrap().disabled = true;
        assert!(!eval(&tree, json!({"type": "choice_equals", "property_name": "kind", "choice": "liquid"})));
    }

    #[test]
    fn all_collects_deps_of_every_child() {
        let tree = tree_with(json!({}));
        let mut deps = BTreeSet::new();
        let node = cond(json!({"type": "all", "conditions": [
            {"type": "literal", "value": false},
            {"type": "bool_equals", "property_name": "dry", "value": true},
            {"type": "choice_equals", "property_name": "kind", "choice": "solid"}
        ]}));
        assert!(!evaluate_node(&tree, &FieldPath::root(), &node, &mut deps));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn register_and_toggle() {
        let mut tree = tree_with(json!({"kind": "solid"}));
        let mut ev = ConditionEvaluator::new();
        let volume = FieldPath::root().child("volume");
        let kind = FieldPath::root().child("kind");

        assert_eq!(ev.phase(&volume), WrapperPhase::Unregistered);
        let flipped = ev.register(&mut tree, &volume);
        assert_eq!(flipped, vec![volume.clone()]);
        assert_eq!(ev.phase(&volume), WrapperPhase::Hidden);
        assert!(tree.field(&volume).unwrap().disabled);
        assert!(tree.region(&volume).unwrap().replacement_visible);

        assert_eq!(ev.dependents_of(&kind), vec![volume.clone()]);
        tree.field_mut(&kind).unwrap().value = "liquid".into();
        let flipped = ev.on_field_changed(&mut tree, &volume, &kind);
        assert_eq!(flipped, vec![volume.clone()]);
        assert_eq!(ev.phase(&volume), WrapperPhase::Visible);
        assert!(!tree.field(&volume).unwrap().disabled);

        // No change in outcome, nothing flips.
        assert!(ev.on_field_changed(&mut tree, &volume, &kind).is_empty());
    }
}
