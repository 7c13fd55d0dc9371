//! Plugin test harness CLI
//!
//! Runs JSON test suites against an editor plugin, with the backend either
//! mocked in-process or running live on the local machine.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use harness::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "harness", about = "Data-driven JSON test harness for editor plugins")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_guard = logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let code = match cli::dispatch(cli.command, cli.verbose).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush the log file before exiting
    drop(log_guard);
    std::process::exit(code);
}
