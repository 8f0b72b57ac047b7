use anyhow::{anyhow, Result};
use formstate_core::config::EngineConfig;
use formstate_core::controller::{Diagnostic, FormController, FormEvent};
use formstate_core::errors::FormError;
use serde::Serialize;
use tracing::{debug, warn};

use crate::io::input;
use crate::output;

#[derive(Debug, Serialize)]
pub struct Pair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct Refused {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RunOut {
    pub submitted: bool,
    pub events: usize,
    pub refused: Vec<Refused>,
    pub pairs: Vec<Pair>,
    /// Identifier to error message, when submission is blocked.
    pub errors: Vec<Pair>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn run(schema_path: &str, events_path: &str, data_path: Option<&str>, config: EngineConfig) -> Result<()> {
    let schema = input::read_schema(schema_path)?;
    let data = input::read_data(data_path)?;
    let events: Vec<FormEvent> = serde_json::from_value(input::read_json_file(events_path)?)
        .map_err(|e| anyhow!("invalid event script {events_path}: {e}"))?;

    let mut ctl = FormController::new(&schema, data.as_ref(), config)?;

    // Addressing errors refuse one event; the script keeps going.
    let mut refused = Vec::new();
    for (index, event) in events.iter().enumerate() {
        match ctl.handle(event.clone()) {
            Ok(report) => debug!(index, events = report.events, truncated = report.truncated, "event applied"),
            Err(e) => {
                warn!(index, error = %e, "event refused");
                refused.push(Refused {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    let (submitted, pairs, errors) = match ctl.submit() {
        Ok(pairs) => {
            let pairs = pairs.into_iter().map(|(name, value)| Pair { name, value }).collect();
            (true, pairs, Vec::new())
        }
        Err(FormError::ValidationPending(_)) => {
            let errors = ctl
                .snapshot()
                .fields
                .into_iter()
                .filter_map(|f| f.error.map(|message| Pair { name: f.id, value: message }))
                .collect();
            (false, Vec::new(), errors)
        }
        Err(e) => return Err(e.into()),
    };

    let summary = if submitted {
        format!("{} pairs submitted", pairs.len())
    } else {
        format!("submission blocked by {} field(s)", errors.len())
    };
    output::print(&RunOut {
        submitted,
        events: events.len(),
        refused,
        pairs,
        errors,
        diagnostics: ctl.take_diagnostics(),
    })?;
    output::summary(submitted, &summary);
    Ok(())
}
