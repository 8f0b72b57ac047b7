//! Submission assembly.
//!
//! Turns the enabled fields of a form into flat `(identifier, value)` pairs for
//! an external persistence endpoint.
//!
//! Rules:
//! - disabled fields are excluded
//! - pairs follow tree (document) order
//! - quantities emit `<id>__magnitude` and `<id>__units`
//! - plain values are trimmed; `_units` values are sent as selected

use tracing::debug;

use crate::config::EngineConfig;
use crate::controller::FormState;
use crate::errors::{FormError, FormResult};
use crate::tree::FieldKind;

pub const MAGNITUDE_SUFFIX: &str = "magnitude";
pub const UNITS_SUFFIX: &str = "units";

pub fn assemble_submission(state: &FormState, config: &EngineConfig) -> FormResult<Vec<(String, String)>> {
    if state.errors.is_blocking() {
        return Err(FormError::ValidationPending(state.errors.len()));
    }

    let root = config.ids.root_prefix.as_str();
    let mut out = Vec::new();
    for (path, field) in state.tree.fields() {
        if field.disabled {
            continue;
        }
        if field.kind == FieldKind::Quantity {
            out.push((
                path.child(MAGNITUDE_SUFFIX).to_identifier(root),
                field.value.trim().to_string(),
            ));
            out.push((
                path.child(UNITS_SUFFIX).to_identifier(root),
                field.units.clone().unwrap_or_default(),
            ));
        } else {
            out.push((path.to_identifier(root), field.value.trim().to_string()));
        }
    }
    debug!(pairs = out.len(), "assembled submission");
    Ok(out)
}
