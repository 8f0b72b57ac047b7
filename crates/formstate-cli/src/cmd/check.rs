use anyhow::Result;
use formstate_core::config::EngineConfig;
use serde::Serialize;

use crate::io::input;
use crate::output;

#[derive(Debug, Serialize)]
pub struct CheckOut {
    pub ok: bool,
    pub containers: usize,
    pub wrappers: usize,
    pub calculations: usize,
    pub cycle_policy: &'static str,
}

pub fn run(schema_path: &str, config: &EngineConfig) -> Result<()> {
    let schema = input::read_schema(schema_path)?;
    let stats = schema.stats();
    let cycle_policy = config.cascade.cycle_policy.as_str();
    output::print(&CheckOut {
        ok: true,
        containers: stats.containers,
        wrappers: stats.wrappers,
        calculations: stats.calculations,
        cycle_policy,
    })?;
    output::summary(
        true,
        &format!(
            "{schema_path}: {} containers, {} wrappers, {} calculations (cycle policy: {cycle_policy})",
            stats.containers, stats.wrappers, stats.calculations
        ),
    );
    Ok(())
}
