use anyhow::Result;

use crate::args::{Cli, Command};
use crate::io::input;

mod check;
mod render;
mod run;

pub fn dispatch(cli: Cli) -> Result<()> {
    let config = input::load_config(cli.config.as_deref(), cli.decimal_delimiter)?;
    match cli.command {
        Command::Check { schema } => check::run(&schema, &config),
        Command::Render { schema, data } => render::run(&schema, data.as_deref(), config),
        Command::Run { schema, events, data } => run::run(&schema, &events, data.as_deref(), config),
    }
}
