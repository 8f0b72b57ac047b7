use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "formstate", version, about = "Form state engine CLI")]
pub struct Cli {
    /// Emit JSON output on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Engine configuration file (JSON). Missing sections use defaults.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Decimal delimiter for calculation inputs and results: `.` or `,`.
    #[arg(long, global = true)]
    pub decimal_delimiter: Option<char>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse and validate a form schema.
    Check {
        /// Schema JSON file.
        schema: String,
    },

    /// Render a form and print every field and container.
    Render {
        schema: String,

        /// Initial data JSON file.
        #[arg(long)]
        data: Option<String>,
    },

    /// Replay an event script against a form and submit it.
    Run {
        schema: String,

        /// JSON array of events, e.g. `[{"op": "set", "id": "object__a", "value": "1"}]`.
        #[arg(long)]
        events: String,

        #[arg(long)]
        data: Option<String>,
    },
}
