//! Per-field validation and the error registry that blocks submission.
//!
//! Checks run on every change of a field and after structural operations.
//! Disabled fields never hold errors: hiding a region clears the errors of
//! everything inside it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::calc::number::{is_sentinel, parse_localized};
use crate::path::FieldPath;
use crate::tree::{Field, FieldKind, FieldTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Check one field against its constraints.
pub fn check_field(field: &Field, delimiter: char) -> Option<ValidationError> {
    if field.disabled {
        return None;
    }
    let c = &field.constraints;
    let value = field.value.trim();

    if value.is_empty() {
        return c
            .required
            .then(|| ValidationError::new("required", "a value is required"));
    }

    match field.kind {
        FieldKind::Text | FieldKind::Choice => {
            let len = value.chars().count();
            if let Some(min) = c.min_length {
                if len < min {
                    return Some(ValidationError::new("min_length", format!("at least {min} characters")));
                }
            }
            if let Some(max) = c.max_length {
                if len > max {
                    return Some(ValidationError::new("max_length", format!("at most {max} characters")));
                }
            }
            if field.kind == FieldKind::Choice && !c.choices.iter().any(|choice| choice == value) {
                return Some(ValidationError::new("choice", format!("`{value}` is not a valid choice")));
            }
        }
        // Non-finite calculation results carry a sentinel and no range.
        FieldKind::Quantity if is_sentinel(value) => return check_units(field),
        FieldKind::Quantity => {
            let Some(n) = parse_localized(value, delimiter) else {
                return Some(ValidationError::new("number", format!("`{value}` is not a number")));
            };
            if let Some(min) = c.minimum {
                if n < min {
                    return Some(ValidationError::new("minimum", format!("must be at least {min}")));
                }
            }
            if let Some(max) = c.maximum {
                if n > max {
                    return Some(ValidationError::new("maximum", format!("must be at most {max}")));
                }
            }
            return check_units(field);
        }
        FieldKind::User | FieldKind::ObjectReference => {
            if value.parse::<i64>().is_err() {
                return Some(ValidationError::new("id", format!("`{value}` is not an id")));
            }
        }
        FieldKind::Bool => {
            if value != "true" && value != "false" {
                return Some(ValidationError::new("bool", format!("`{value}` is not a boolean")));
            }
        }
    }
    None
}

fn check_units(field: &Field) -> Option<ValidationError> {
    let units = field.units.as_ref()?;
    let allowed = &field.constraints.units;
    (!allowed.is_empty() && !allowed.contains(units))
        .then(|| ValidationError::new("units", format!("unknown unit `{units}`")))
}

/// Errors of the whole form, keyed by field path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationRegistry {
    errors: BTreeMap<FieldPath, ValidationError>,
}

impl ValidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-check the field at `path`; a missing field clears its entry.
    pub fn revalidate(&mut self, tree: &FieldTree, path: &FieldPath, delimiter: char) {
        match tree.field(path).and_then(|f| check_field(f, delimiter)) {
            Some(err) => {
                self.errors.insert(path.clone(), err);
            }
            None => {
                self.errors.remove(path);
            }
        }
    }

    /// Re-check every field at or below `prefix` and drop entries for fields
    /// that no longer exist there.
    pub fn revalidate_subtree(&mut self, tree: &FieldTree, prefix: &FieldPath, delimiter: char) {
        self.remove_subtree(prefix);
        let found: Vec<(FieldPath, ValidationError)> = tree
            .subtree(prefix)
            .filter_map(|(p, n)| n.field().and_then(|f| check_field(f, delimiter)).map(|e| (p.clone(), e)))
            .collect();
        self.errors.extend(found);
    }

    pub fn remove_subtree(&mut self, prefix: &FieldPath) {
        self.errors.retain(|p, _| !p.starts_with(prefix));
    }

    pub fn get(&self, path: &FieldPath) -> Option<&ValidationError> {
        self.errors.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &ValidationError)> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Submission is blocked while any error exists.
    pub fn is_blocking(&self) -> bool {
        !self.errors.is_empty()
    }
}
