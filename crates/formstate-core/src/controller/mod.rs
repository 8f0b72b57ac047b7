//! The form controller: one owner for all runtime state.
//!
//! `FormController` owns a [`FormState`] (rendered tree, condition states,
//! calculation registrations/memos/suggestions, validation errors) and is the
//! only place that mutates it. Every [`FormEvent`] runs synchronously together
//! with its whole cascade before `handle` returns.
//!
//! Cascade model:
//! - a queue of "field changed" messages, each carrying the set of calculation
//!   targets already written in this cascade (`visited`)
//! - a changed field re-evaluates the conditions and calculations that read it
//! - a region toggle queues every field whose disabled flag flipped
//! - a calculation write queues its target with `visited + target`, unless the
//!   target was already visited
//! - at most `cascade.max_events` messages are processed; the rest is dropped
//!   with a `cascade.truncated` diagnostic
//!
//! Structural operations on arrays return a registry diff which is applied
//! here: registrations below removed roots are dropped, registrations below
//! added roots are created, and registrations that read anything in the
//! affected containers are re-evaluated.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::array::{self, ArrayOp, ArrayOutcome, RegistryDiff};
use crate::calc::{CalcOutcome, CalculationEngine};
use crate::condition::ConditionEvaluator;
use crate::config::{validate_config, CyclePolicy, EngineConfig};
use crate::errors::{FormError, FormResult};
use crate::path::FieldPath;
use crate::schema::FormSchema;
use crate::submit::assemble_submission;
use crate::tree::{render_form, FieldTree};
use crate::validation::ValidationRegistry;

pub mod view;

pub use view::{ContainerView, FieldView, FormSnapshot};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Structured record of something the controller skipped or refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    pub data: BTreeMap<String, String>,
}

/// A user or script action on the form. Identifiers use the external
/// `<root>__<segment>...` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FormEvent {
    Set { id: String, value: String },
    SetUnits { id: String, units: String },
    AddItem { container: String },
    DeleteItem { container: String, index: usize },
    CopyRow { container: String, index: usize },
    Clear { container: String },
    AddColumn { container: String },
    DeleteColumn { container: String, column: usize },
    ApplySuggestion { id: String },
    DismissSuggestion { id: String },
}

/// What one cascade did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Messages processed, including the originating one.
    pub events: usize,
    /// Messages queued by calculation writes.
    pub propagated: usize,
    pub truncated: bool,
}

/// All mutable state of one form.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    pub tree: FieldTree,
    pub conditions: ConditionEvaluator,
    pub calculations: CalculationEngine,
    pub errors: ValidationRegistry,
}

struct Pending {
    path: FieldPath,
    visited: BTreeSet<FieldPath>,
}

#[derive(Default)]
struct Queue {
    items: VecDeque<Pending>,
    propagated: usize,
}

impl Queue {
    fn changed(&mut self, path: FieldPath) {
        self.items.push_back(Pending {
            path,
            visited: BTreeSet::new(),
        });
    }

    fn changed_all(&mut self, paths: impl IntoIterator<Item = FieldPath>, visited: &BTreeSet<FieldPath>) {
        for path in paths {
            self.items.push_back(Pending {
                path,
                visited: visited.clone(),
            });
        }
    }
}

#[derive(Debug)]
pub struct FormController {
    config: EngineConfig,
    state: FormState,
    diagnostics: Vec<Diagnostic>,
}

impl FormController {
    /// Render `schema` with optional initial `data`, register every wrapper
    /// and calculation, and settle the initial cascade.
    pub fn new(schema: &FormSchema, data: Option<&Value>, config: EngineConfig) -> FormResult<Self> {
        validate_config(&config)?;
        schema.validate()?;
        let tree = render_form(schema, data, &config)?;

        let mut ctl = Self {
            config,
            state: FormState {
                tree,
                ..FormState::default()
            },
            diagnostics: Vec::new(),
        };

        let mut queue = Queue::default();
        let wrappers = ctl.wrappers_under(&FieldPath::root());
        for w in wrappers {
            let flipped = ctl.state.conditions.register(&mut ctl.state.tree, &w);
            queue.changed_all(flipped, &BTreeSet::new());
        }

        let targets = ctl.targets_under(&FieldPath::root());
        for t in &targets {
            ctl.state.calculations.register(&ctl.state.tree, t)?;
        }
        ctl.check_cycles(true)?;

        let delimiter = ctl.delimiter();
        ctl.state
            .errors
            .revalidate_subtree(&ctl.state.tree, &FieldPath::root(), delimiter);

        for t in &targets {
            ctl.run_calculation(t, &BTreeSet::new(), &mut queue);
        }
        let report = ctl.drain(queue);
        info!(
            fields = ctl.state.tree.fields().count(),
            wrappers = ctl.state.conditions.len(),
            calculations = ctl.state.calculations.len(),
            events = report.events,
            "form initialized"
        );
        Ok(ctl)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Mutable access for callers that restore saved state (memos etc.).
    pub fn state_mut(&mut self) -> &mut FormState {
        &mut self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Parse an external identifier with the configured root.
    pub fn path(&self, id: &str) -> FormResult<FieldPath> {
        FieldPath::parse_identifier(&self.config.ids.root_prefix, id)
    }

    pub fn identifier(&self, path: &FieldPath) -> String {
        path.to_identifier(&self.config.ids.root_prefix)
    }

    /// Current value of the field `id`, if it exists.
    pub fn value(&self, id: &str) -> Option<&str> {
        let path = self.path(id).ok()?;
        self.state.tree.field(&path).map(|f| f.value.as_str())
    }

    pub fn snapshot(&self) -> FormSnapshot {
        view::snapshot(&self.state, &self.config)
    }

    pub fn submit(&mut self) -> FormResult<Vec<(String, String)>> {
        match assemble_submission(&self.state, &self.config) {
            Err(FormError::ValidationPending(n)) => {
                warn!(errors = n, "submission blocked");
                let mut data = BTreeMap::new();
                for (path, err) in self.state.errors.iter() {
                    data.insert(self.identifier(path), err.code.to_string());
                }
                self.push(DiagnosticLevel::Error, "submit.blocked", format!("{n} validation error(s)"), data);
                Err(FormError::ValidationPending(n))
            }
            other => other,
        }
    }

    /// Run one event and its whole cascade.
    pub fn handle(&mut self, event: FormEvent) -> FormResult<CascadeReport> {
        debug!(?event, "handling event");
        let mut queue = Queue::default();
        match event {
            FormEvent::Set { id, value } => {
                let path = self.editable_field(&id)?;
                if let Some(f) = self.state.tree.field_mut(&path) {
                    f.value = value;
                }
                self.state.calculations.take_suggestion(&path);
                queue.changed(path);
            }
            FormEvent::SetUnits { id, units } => {
                let path = self.editable_field(&id)?;
                if let Some(f) = self.state.tree.field_mut(&path) {
                    f.units = Some(units);
                }
                queue.changed(path);
            }
            FormEvent::ApplySuggestion { id } => {
                let path = self.editable_field(&id)?;
                let suggestion = self
                    .state
                    .calculations
                    .take_suggestion(&path)
                    .ok_or_else(|| FormError::invalid_argument(format!("{id}: no pending suggestion")))?;
                if let Some(f) = self.state.tree.field_mut(&path) {
                    f.value = suggestion.value.clone();
                }
                self.state.calculations.set_memo(path.clone(), suggestion.value);
                queue.changed(path);
            }
            FormEvent::DismissSuggestion { id } => {
                let path = self.path(&id)?;
                self.state
                    .calculations
                    .take_suggestion(&path)
                    .ok_or_else(|| FormError::invalid_argument(format!("{id}: no pending suggestion")))?;
            }
            FormEvent::AddItem { container } => self.structural(&container, ArrayOp::AddItem, &mut queue)?,
            FormEvent::DeleteItem { container, index } => {
                self.structural(&container, ArrayOp::DeleteItem(index), &mut queue)?
            }
            FormEvent::CopyRow { container, index } => {
                self.structural(&container, ArrayOp::CopyRow(index), &mut queue)?
            }
            FormEvent::Clear { container } => self.structural(&container, ArrayOp::Clear, &mut queue)?,
            FormEvent::AddColumn { container } => self.structural(&container, ArrayOp::AddColumn, &mut queue)?,
            FormEvent::DeleteColumn { container, column } => {
                self.structural(&container, ArrayOp::DeleteColumn(column), &mut queue)?
            }
        }
        Ok(self.drain(queue))
    }

    fn delimiter(&self) -> char {
        self.config.numbers.decimal_delimiter
    }

    fn push(&mut self, level: DiagnosticLevel, code: &str, message: impl Into<String>, data: BTreeMap<String, String>) {
        self.diagnostics.push(Diagnostic {
            level,
            code: code.to_string(),
            message: message.into(),
            data,
        });
    }

    fn editable_field(&self, id: &str) -> FormResult<FieldPath> {
        let path = self.path(id)?;
        match self.state.tree.field(&path) {
            None => Err(FormError::UnknownField(id.to_string())),
            Some(f) if f.disabled => Err(FormError::invalid_argument(format!("{id}: field is disabled"))),
            Some(_) => Ok(path),
        }
    }

    fn wrappers_under(&self, prefix: &FieldPath) -> Vec<FieldPath> {
        self.state
            .tree
            .subtree(prefix)
            .filter(|(_, n)| !n.conditions.is_empty())
            .map(|(p, _)| p.clone())
            .collect()
    }

    fn targets_under(&self, prefix: &FieldPath) -> Vec<FieldPath> {
        self.state
            .tree
            .subtree(prefix)
            .filter(|(_, n)| n.calculation.is_some() && n.field().is_some())
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Under `reject`, a cycle fails construction; otherwise it is reported.
    fn check_cycles(&mut self, constructing: bool) -> FormResult<()> {
        let Some(cycle) = self.state.calculations.find_cycle() else {
            return Ok(());
        };
        let ids: Vec<String> = cycle.iter().map(|p| self.identifier(p)).collect();
        if constructing && self.config.cascade.cycle_policy == CyclePolicy::Reject {
            return Err(FormError::CalculationCycle(ids));
        }
        warn!(cycle = %ids.join(" -> "), "calculation cycle detected");
        let data = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (i.to_string(), id.clone()))
            .collect();
        self.push(
            DiagnosticLevel::Warning,
            "calc.cycle",
            format!("calculations form a cycle through {} field(s)", ids.len().saturating_sub(1)),
            data,
        );
        Ok(())
    }

    fn run_calculation(&mut self, target: &FieldPath, visited: &BTreeSet<FieldPath>, queue: &mut Queue) {
        let delimiter = self.delimiter();
        let outcome = self
            .state
            .calculations
            .evaluate(&mut self.state.tree, target, visited, delimiter);
        match outcome {
            CalcOutcome::Written { propagate: true, .. } => {
                let mut next = visited.clone();
                next.insert(target.clone());
                queue.items.push_back(Pending {
                    path: target.clone(),
                    visited: next,
                });
                queue.propagated += 1;
            }
            CalcOutcome::Written { propagate: false, .. } => {
                debug!(target = %target, "target already visited, not propagating");
                self.state.errors.revalidate(&self.state.tree, target, delimiter);
            }
            CalcOutcome::Skipped | CalcOutcome::Unchanged | CalcOutcome::Suggested { .. } => {}
        }
    }

    fn drain(&mut self, mut queue: Queue) -> CascadeReport {
        let max = self.config.cascade.max_events;
        let delimiter = self.delimiter();
        let mut report = CascadeReport::default();

        while let Some(Pending { path, visited }) = queue.items.pop_front() {
            if report.events >= max {
                report.truncated = true;
                let dropped = queue.items.len() + 1;
                warn!(max, dropped, "cascade truncated");
                let mut data = BTreeMap::new();
                data.insert("max_events".to_string(), max.to_string());
                data.insert("dropped".to_string(), dropped.to_string());
                self.push(
                    DiagnosticLevel::Warning,
                    "cascade.truncated",
                    format!("cascade stopped after {max} events"),
                    data,
                );
                break;
            }
            report.events += 1;

            self.state.errors.revalidate(&self.state.tree, &path, delimiter);

            for wrapper in self.state.conditions.dependents_of(&path) {
                let flipped = self
                    .state
                    .conditions
                    .on_field_changed(&mut self.state.tree, &wrapper, &path);
                queue.changed_all(flipped, &visited);
            }
            for target in self.state.calculations.dependents_of(&path) {
                self.run_calculation(&target, &visited, &mut queue);
            }
        }
        report.propagated = queue.propagated;
        report
    }

    fn structural(&mut self, container: &str, op: ArrayOp, queue: &mut Queue) -> FormResult<()> {
        let path = self.path(container)?;
        match array::apply(&mut self.state.tree, &path, op, &self.config)? {
            ArrayOutcome::Applied(diff) => self.apply_registry_diff(diff, queue),
            ArrayOutcome::Rejected(reason) => {
                let mut data = BTreeMap::new();
                data.insert("container".to_string(), container.to_string());
                data.insert("op".to_string(), op.as_str().to_string());
                self.push(DiagnosticLevel::Warning, "array.rejected", reason, data);
                Ok(())
            }
        }
    }

    fn apply_registry_diff(&mut self, diff: RegistryDiff, queue: &mut Queue) -> FormResult<()> {
        let delimiter = self.delimiter();
        let removed = diff.removed_roots();
        let added = diff.added_roots();

        for root in &diff.dropped {
            self.state.conditions.unregister_subtree(root);
            self.state.calculations.unregister_subtree(root);
            self.state.errors.remove_subtree(root);
        }
        for (from, _) in &diff.moved {
            self.state.conditions.unregister_subtree(from);
            self.state.calculations.unregister_only(from);
            self.state.errors.remove_subtree(from);
        }
        self.state.calculations.rebase(&diff.moved);

        let mut fresh_targets = Vec::new();
        for root in &added {
            let flipped = self.state.tree.refresh_disabled(root);
            queue.changed_all(flipped, &BTreeSet::new());

            for w in self.wrappers_under(root) {
                let flipped = self.state.conditions.register(&mut self.state.tree, &w);
                queue.changed_all(flipped, &BTreeSet::new());
            }
            for t in self.targets_under(root) {
                self.state.calculations.register(&self.state.tree, &t)?;
                fresh_targets.push(t);
            }
            self.state.errors.revalidate_subtree(&self.state.tree, root, delimiter);
        }

        let mut roots: BTreeSet<FieldPath> = removed.into_iter().chain(added.iter().cloned()).collect();
        roots.insert(diff.container.clone());

        let under_added = |p: &FieldPath| added.iter().any(|a| p.starts_with(a));
        for w in self.state.conditions.touching(&roots) {
            if under_added(&w) {
                continue;
            }
            let flipped = self.state.conditions.register(&mut self.state.tree, &w);
            queue.changed_all(flipped, &BTreeSet::new());
        }

        let registered_new = !fresh_targets.is_empty();
        let mut targets: BTreeSet<FieldPath> = self
            .state
            .calculations
            .touching(&roots)
            .into_iter()
            .collect();
        targets.extend(fresh_targets);
        for t in &targets {
            self.run_calculation(t, &BTreeSet::new(), queue);
        }

        if registered_new {
            self.check_cycles(false)?;
        }
        debug!(
            container = %diff.container,
            removed = diff.removed_roots().len(),
            added = added.len(),
            recalculated = targets.len(),
            "registry diff applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "state": {"type": "text", "choices": ["solid", "liquid"]},
                "mass": {"type": "quantity", "units": ["g"]},
                "volume": {
                    "type": "quantity", "units": ["ml"],
                    "conditions": [{"type": "choice_equals", "property_name": "state", "choice": "liquid"}]
                },
                "density": {
                    "type": "quantity",
                    "calculation": {"property_names": ["mass", "volume"], "formula": "mass / volume", "digits": 1}
                }
            }
        }))
        .unwrap()
    }

    fn ctl(data: serde_json::Value) -> FormController {
        FormController::new(&schema(), Some(&data), EngineConfig::default()).unwrap()
    }

    fn set(c: &mut FormController, id: &str, value: &str) -> CascadeReport {
        c.handle(FormEvent::Set {
            id: id.into(),
            value: value.into(),
        })
        .unwrap()
    }

    #[test]
    fn hidden_input_blocks_calculation() {
        let mut c = ctl(json!({"state": "solid", "mass": 10, "volume": 4}));
        assert_eq!(c.value("object__density"), Some(""));

        set(&mut c, "object__state", "liquid");
        assert_eq!(c.value("object__density"), Some("2.5"));
    }

    #[test]
    fn user_edit_wins_and_suggestion_can_be_applied() {
        let mut c = ctl(json!({"state": "liquid", "mass": 10, "volume": 4}));
        assert_eq!(c.value("object__density"), Some("2.5"));

        set(&mut c, "object__density", "3");
        set(&mut c, "object__mass", "20");
        assert_eq!(c.value("object__density"), Some("3"));
        let density = c.path("object__density").unwrap();
        assert_eq!(c.state().calculations.suggestion(&density).unwrap().value, "5.0");

        c.handle(FormEvent::ApplySuggestion {
            id: "object__density".into(),
        })
        .unwrap();
        assert_eq!(c.value("object__density"), Some("5.0"));

        // Back under engine control: the next change overwrites.
        set(&mut c, "object__mass", "40");
        assert_eq!(c.value("object__density"), Some("10.0"));
    }

    #[test]
    fn editing_disabled_field_is_refused() {
        let mut c = ctl(json!({"state": "solid"}));
        let r = c.handle(FormEvent::Set {
            id: "object__volume".into(),
            value: "1".into(),
        });
        assert_matches!(r, Err(FormError::InvalidArgument(_)));
        assert_matches!(
            c.handle(FormEvent::Set { id: "object__nope".into(), value: "1".into() }),
            Err(FormError::UnknownField(_))
        );
    }

    #[test]
    fn events_deserialize_from_script() {
        let ev: FormEvent = serde_json::from_value(json!({"op": "delete_item", "container": "object__rows", "index": 2})).unwrap();
        assert_eq!(
            ev,
            FormEvent::DeleteItem {
                container: "object__rows".into(),
                index: 2
            }
        );
    }

    #[test]
    fn submission_excludes_disabled_fields() {
        let mut c = ctl(json!({"state": "solid", "mass": " 10 "}));
        let pairs = c.submit().unwrap();
        let ids: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert!(!ids.iter().any(|id| id.starts_with("object__volume")));
        assert!(pairs.contains(&("object__mass__magnitude".to_string(), "10".to_string())));
        assert!(pairs.contains(&("object__mass__units".to_string(), "g".to_string())));
    }

    #[test]
    fn blocked_submission_records_diagnostic() {
        let mut c = ctl(json!({"state": "gas"}));
        assert_matches!(c.submit(), Err(FormError::ValidationPending(1)));
        assert!(c.diagnostics().iter().any(|d| d.code == "submit.blocked"));
    }

    #[test]
    fn reject_policy_refuses_cycles() {
        let s = FormSchema::from_value(json!({
            "type": "object",
            "properties": {
                "a": {"type": "quantity", "calculation": {"property_names": ["b"], "formula": "b * 2"}},
                "b": {"type": "quantity", "calculation": {"property_names": ["a"], "formula": "a / 2"}}
            }
        }))
        .unwrap();
        let mut cfg = EngineConfig::default();
        cfg.cascade.cycle_policy = CyclePolicy::Reject;
        assert_matches!(FormController::new(&s, None, cfg), Err(FormError::CalculationCycle(_)));

        let c = FormController::new(&s, None, EngineConfig::default()).unwrap();
        assert!(c.diagnostics().iter().any(|d| d.code == "calc.cycle"));
    }
}
