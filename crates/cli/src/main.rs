//! FIRE command-line tool
//!
//! Seeds reference data into the assignment database, runs the engine over
//! every pending ticket and inspects the results.
//!
//! # Usage
//!
//! ```bash
//! fire init
//! fire seed data/seed.json
//! fire run --concurrency 16
//! fire assign 2f6d9c1e
//! fire explain 2f6d9c1e --format json
//! fire loads
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod output;
mod seed;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "fire")]
#[command(version)]
#[command(about = "FIRE ticket assignment engine", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, env = "FIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides `database.url` from the configuration
    #[arg(long, env = "FIRE_DATABASE_URL")]
    database: Option<String>,

    /// Log level, overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    Init,
    /// Load offices, managers, tickets and analyses from a JSON file
    Seed {
        /// Seed file
        file: PathBuf,
    },
    /// Assign every ticket that has an analysis but no assignment yet
    Run {
        /// Tickets processed in parallel
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Assign a single ticket
    Assign {
        /// Ticket guid
        guid: String,
    },
    /// Show the decision trace of an assigned ticket
    Explain {
        /// Ticket guid
        guid: String,
        /// Ask why the ticket did not go to this office or manager
        #[arg(long)]
        why_not: Option<String>,
    },
    /// Show manager loads and check them against the assignment log
    Loads,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::execute(cli).await {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        std::process::exit(1);
    }
}
