//! Polo: a long-running collector daemon.
//!
//! # Usage
//!
//! ```text
//! polo run [-t N] [-l LOG_FILE] [-p STORAGE_DIR] [-c CONFIG] [-v]
//! polo inspect -p STORAGE_DIR [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{inspect::InspectArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "polo",
    version,
    about = "Poll configured sources on a schedule and keep the results in a persisted store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the collector daemon in the foreground until SIGINT/SIGTERM.
    Run(RunArgs),

    /// Print the store snapshot saved in a storage directory.
    Inspect(InspectArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Inspect(args) => args.run(),
    }
}
