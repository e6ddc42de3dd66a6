//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod simulate;
mod stages;

pub use simulate::SimulateArgs;

use anyhow::Result;
use clap::Subcommand;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the stages of the default pipeline
    Stages {
        /// Print stages as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drive one run of the pipeline and watch its progress
    Simulate(SimulateArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Stages { json } => stages::list_stages(json),
        Commands::Simulate(args) => simulate::handle_simulate(args).await,
    }
}
