//! Calculated fields.
//!
//! A calculation binds formula aliases to relative paths and writes its result
//! into the field that declares it (the target). Evaluation follows a fixed
//! sequence:
//!
//! 1. resolve every alias; wildcard aliases collect all enabled, non-empty
//!    values into a list, scalar aliases take the first one
//! 2. any alias without a usable value makes the target "not yet computable"
//!    and the evaluation is skipped
//! 3. every value is parsed with the configured decimal delimiter; a parse
//!    failure also skips the evaluation
//! 4. the formula is evaluated; the result is rounded to `digits` when given
//!    and non-finite results are rendered as sentinels
//! 5. the overwrite policy decides between writing and offering a suggestion
//!
//! Notes:
//! - Memos hold the last value the engine itself wrote, per target.
//! - The engine never decides whether to propagate on its own: it reports
//!   `propagate = false` when the target was already visited in the current
//!   cascade, and the controller stops there.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::calc::formula::{Formula, Value};
use crate::calc::number::{format_result, parse_localized};
use crate::errors::{FormError, FormResult};
use crate::path::{resolve, FieldPath};
use crate::schema::CalculationSchema;
use crate::tree::FieldTree;

pub mod formula;
pub mod number;

/// A pending result the engine did not write because the user edited the
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub value: String,
}

/// Result of evaluating one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcOutcome {
    /// Inputs missing, disabled, unparseable, or the formula failed.
    Skipped,
    /// Computed value already present; only the memo was updated.
    Unchanged,
    Written { value: String, propagate: bool },
    Suggested { value: String },
}

#[derive(Debug, Clone)]
struct Registration {
    formula: Formula,
    declared: CalculationSchema,
    /// Paths read by the last resolution, including missing candidates and
    /// wildcard containers.
    deps: BTreeSet<FieldPath>,
}

#[derive(Debug, Clone, Default)]
pub struct CalculationEngine {
    registrations: BTreeMap<FieldPath, Registration>,
    memos: BTreeMap<FieldPath, String>,
    suggestions: BTreeMap<FieldPath, Suggestion>,
}

impl CalculationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register the calculation declared by the node at `target`.
    ///
    /// Returns `Ok(false)` when the node carries no calculation.
    pub fn register(&mut self, tree: &FieldTree, target: &FieldPath) -> FormResult<bool> {
        let Some(declared) = tree.node(target).and_then(|n| n.calculation.clone()) else {
            return Ok(false);
        };
        let formula = Formula::parse(&declared.formula)
            .map_err(|e| FormError::schema(format!("{target}: formula `{}`: {e}", declared.formula)))?;
        let mut deps = BTreeSet::new();
        collect_inputs(tree, target, &declared, &mut deps, None);
        debug!(target = %target, inputs = declared.inputs.len(), deps = deps.len(), "registered calculation");
        self.registrations
            .insert(target.clone(), Registration { formula, declared, deps });
        Ok(true)
    }

    /// Drop registrations, memos and suggestions at or below `prefix`.
    pub fn unregister_subtree(&mut self, prefix: &FieldPath) {
        self.registrations.retain(|p, _| !p.starts_with(prefix));
        self.memos.retain(|p, _| !p.starts_with(prefix));
        self.suggestions.retain(|p, _| !p.starts_with(prefix));
    }

    /// Drop registrations only; memos and suggestions stay for [`Self::rebase`].
    pub fn unregister_only(&mut self, prefix: &FieldPath) {
        self.registrations.retain(|p, _| !p.starts_with(prefix));
    }

    /// Move memos and suggestions of renumbered items. `moves` pairs old and
    /// new item roots; all pairs are applied at once.
    pub fn rebase(&mut self, moves: &[(FieldPath, FieldPath)]) {
        if moves.is_empty() {
            return;
        }
        let relocate = |p: FieldPath| -> FieldPath {
            moves
                .iter()
                .find_map(|(from, to)| p.rebase(from, to))
                .unwrap_or(p)
        };
        self.memos = std::mem::take(&mut self.memos)
            .into_iter()
            .map(|(p, v)| (relocate(p), v))
            .collect();
        self.suggestions = std::mem::take(&mut self.suggestions)
            .into_iter()
            .map(|(p, v)| (relocate(p), v))
            .collect();
    }

    /// Targets whose last resolution read `field`.
    pub fn dependents_of(&self, field: &FieldPath) -> Vec<FieldPath> {
        self.registrations
            .iter()
            .filter(|(_, r)| r.deps.contains(field))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Targets reading anything at or below (or above) one of `roots`.
    pub fn touching(&self, roots: &BTreeSet<FieldPath>) -> Vec<FieldPath> {
        self.registrations
            .iter()
            .filter(|(_, r)| {
                r.deps
                    .iter()
                    .any(|d| roots.iter().any(|root| d.starts_with(root) || root.starts_with(d)))
            })
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn memo(&self, target: &FieldPath) -> Option<&str> {
        self.memos.get(target).map(String::as_str)
    }

    /// Seed a memo as if the engine had written `value`.
    pub fn set_memo(&mut self, target: FieldPath, value: impl Into<String>) {
        self.memos.insert(target, value.into());
    }

    pub fn suggestion(&self, target: &FieldPath) -> Option<&Suggestion> {
        self.suggestions.get(target)
    }

    pub fn suggestions(&self) -> impl Iterator<Item = (&FieldPath, &Suggestion)> {
        self.suggestions.iter()
    }

    pub fn take_suggestion(&mut self, target: &FieldPath) -> Option<Suggestion> {
        self.suggestions.remove(target)
    }

    /// Values each alias of `target` would be bound to right now, or `None`
    /// while the target is not computable.
    pub fn bound_inputs(&self, tree: &FieldTree, target: &FieldPath, delimiter: char) -> Option<BTreeMap<String, Value>> {
        let reg = self.registrations.get(target)?;
        collect_inputs(tree, target, &reg.declared, &mut BTreeSet::new(), Some(delimiter))
    }

    /// Compute the current result for `target` without applying it.
    pub fn compute(&mut self, tree: &FieldTree, target: &FieldPath, delimiter: char) -> Option<String> {
        let reg = self.registrations.get_mut(target)?;
        let mut deps = BTreeSet::new();
        let env = collect_inputs(tree, target, &reg.declared, &mut deps, Some(delimiter));
        reg.deps = deps;
        let env = env?;

        match reg.formula.evaluate(&env) {
            Ok(Value::Number(n)) => Some(format_result(n, reg.declared.digits, delimiter)),
            Ok(Value::List(_)) => {
                trace!(target = %target, "formula produced a list, skipping");
                None
            }
            Err(e) => {
                trace!(target = %target, error = %e, "formula evaluation failed, skipping");
                None
            }
        }
    }

    /// Evaluate `target` and apply the overwrite policy.
    ///
    /// The field is overwritten only when it is empty or still holds the memo.
    pub fn evaluate(
        &mut self,
        tree: &mut FieldTree,
        target: &FieldPath,
        visited: &BTreeSet<FieldPath>,
        delimiter: char,
    ) -> CalcOutcome {
        let Some(computed) = self.compute(tree, target, delimiter) else {
            return CalcOutcome::Skipped;
        };
        let Some(field) = tree.field_mut(target) else {
            return CalcOutcome::Skipped;
        };

        if field.value == computed {
            self.memos.insert(target.clone(), computed);
            self.suggestions.remove(target);
            return CalcOutcome::Unchanged;
        }

        let memo = self.memos.get(target);
        if field.is_empty() || memo == Some(&field.value) {
            debug!(target = %target, value = %computed, "calculation wrote result");
            field.value = computed.clone();
            self.memos.insert(target.clone(), computed.clone());
            self.suggestions.remove(target);
            return CalcOutcome::Written {
                value: computed,
                propagate: !visited.contains(target),
            };
        }

        debug!(target = %target, value = %computed, "user edit kept, offering suggestion");
        self.suggestions.insert(
            target.clone(),
            Suggestion {
                value: computed.clone(),
            },
        );
        CalcOutcome::Suggested { value: computed }
    }

    /// First cycle in the graph "target reads target", as a closed walk.
    pub fn find_cycle(&self) -> Option<Vec<FieldPath>> {
        let edges: BTreeMap<&FieldPath, Vec<&FieldPath>> = self
            .registrations
            .iter()
            .map(|(t, r)| {
                let next = r
                    .deps
                    .iter()
                    .filter(|d| self.registrations.contains_key(*d))
                    .collect();
                (t, next)
            })
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Open,
            Done,
        }
        let mut marks: BTreeMap<&FieldPath, Mark> = BTreeMap::new();

        fn visit<'a>(
            node: &'a FieldPath,
            edges: &BTreeMap<&'a FieldPath, Vec<&'a FieldPath>>,
            marks: &mut BTreeMap<&'a FieldPath, Mark>,
            stack: &mut Vec<&'a FieldPath>,
        ) -> Option<Vec<FieldPath>> {
            marks.insert(node, Mark::Open);
            stack.push(node);
            for next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
                match marks.get(next) {
                    Some(Mark::Open) => {
                        let start = stack.iter().position(|p| p == next).unwrap_or(0);
                        let mut cycle: Vec<FieldPath> = stack[start..].iter().map(|p| (*p).clone()).collect();
                        cycle.push((*next).clone());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(c) = visit(*next, edges, marks, stack) {
                            return Some(c);
                        }
                    }
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for start in edges.keys() {
            if marks.contains_key(start) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(c) = visit(*start, &edges, &mut marks, &mut stack) {
                return Some(c);
            }
        }
        None
    }
}

/// Resolve every alias of `declared` relative to the target's parent object.
///
/// Always fills `deps` completely. Returns the formula environment when every
/// alias has usable values and, if `delimiter` is given, all of them parse.
fn collect_inputs(
    tree: &FieldTree,
    target: &FieldPath,
    declared: &CalculationSchema,
    deps: &mut BTreeSet<FieldPath>,
    delimiter: Option<char>,
) -> Option<BTreeMap<String, Value>> {
    let base = target.parent().unwrap_or_default();
    let mut env = BTreeMap::new();
    let mut available = true;

    for (alias, rel) in &declared.inputs {
        let resolution = resolve(tree, &base, rel);
        deps.extend(resolution.candidates.iter().cloned());
        deps.extend(resolution.expanded.iter().cloned());
        if !available {
            continue;
        }

        let raw: Vec<&str> = resolution
            .fields
            .iter()
            .filter_map(|p| tree.field(p))
            .filter(|f| !f.disabled && !f.is_empty())
            .map(|f| f.value.trim())
            .collect();
        if raw.is_empty() {
            trace!(target = %target, alias = %alias, "input unavailable");
            available = false;
            continue;
        }
        let Some(delimiter) = delimiter else {
            continue;
        };

        let mut numbers = Vec::with_capacity(raw.len());
        for text in raw {
            match parse_localized(text, delimiter) {
                Some(n) => numbers.push(n),
                None => {
                    trace!(target = %target, alias = %alias, value = text, "input is not a number");
                    available = false;
                    break;
                }
            }
        }
        if !available {
            continue;
        }
        let value = if rel.has_wildcard() {
            Value::List(numbers)
        } else {
            Value::Number(numbers[0])
        };
        env.insert(alias.clone(), value);
    }

    (available && delimiter.is_some()).then_some(env)
}
