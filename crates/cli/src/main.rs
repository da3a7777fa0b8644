//! ECS service discovery CLI
//!
//! Validates discovery configurations, runs one-shot discovery against an
//! inventory snapshot, and inspects published scrape target files.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{discover, targets, validate};
use std::path::PathBuf;

/// ECS service discovery CLI
#[derive(Parser)]
#[command(name = "sdctl")]
#[command(author, version, about = "CLI for ECS service discovery", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, validate and compile a configuration file
    Validate {
        /// Configuration file (TOML)
        config: PathBuf,
    },

    /// Show the targets of a published result file
    Targets {
        /// Result file written by the agent
        file: PathBuf,

        /// Only show targets with this job label
        #[arg(long, short)]
        job: Option<String>,
    },

    /// Run a single discovery tick against an inventory snapshot
    Discover {
        /// Configuration file (TOML)
        config: PathBuf,

        /// Inventory snapshot (JSON), overrides inventory_file
        #[arg(long, short)]
        inventory: Option<PathBuf>,

        /// Result file to publish, overrides sd_result_file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { config } => validate::validate_config(&config, cli.format),
        Commands::Targets { file, job } => targets::show_targets(&file, job.as_deref(), cli.format),
        Commands::Discover {
            config,
            inventory,
            output,
        } => discover::run_once(&config, inventory, output, cli.format).await,
    }
}
