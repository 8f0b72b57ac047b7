use anyhow::Result;
use formstate_core::config::EngineConfig;
use formstate_core::controller::{Diagnostic, FormController, FormSnapshot};
use serde::Serialize;

use crate::io::input;
use crate::output;

#[derive(Debug, Serialize)]
pub struct RenderOut {
    #[serde(flatten)]
    pub snapshot: FormSnapshot,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn run(schema_path: &str, data_path: Option<&str>, config: EngineConfig) -> Result<()> {
    let schema = input::read_schema(schema_path)?;
    let data = input::read_data(data_path)?;
    let mut ctl = FormController::new(&schema, data.as_ref(), config)?;

    let snapshot = ctl.snapshot();
    let summary = format!(
        "{} fields, {} containers, {} validation errors",
        snapshot.fields.len(),
        snapshot.containers.len(),
        snapshot.errors
    );
    output::print(&RenderOut {
        snapshot,
        diagnostics: ctl.take_diagnostics(),
    })?;
    output::summary(true, &summary);
    Ok(())
}
