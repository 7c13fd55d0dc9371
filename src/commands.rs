//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::UnknownHandlerPolicy;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the JSON test suite
    Run {
        #[command(flatten)]
        suite: SuiteArgs,

        /// What to do with steps that have no registered handler
        #[arg(long, value_enum)]
        unknown: Option<UnknownHandlerPolicy>,

        /// Only run cases whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// List discovered test cases and whether they would run
    List {
        #[command(flatten)]
        suite: SuiteArgs,
    },
}

/// Options locating the suite, shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct SuiteArgs {
    /// Suite directory holding tests/, actions/ and expectations/
    #[arg(long)]
    pub suite: Option<PathBuf>,

    /// Feature-set file (JSON array of feature names)
    #[arg(long)]
    pub features: Option<PathBuf>,

    /// Run against the live backend instead of the mock
    #[arg(long)]
    pub live: bool,

    /// Configuration file to use instead of the default one
    #[arg(long)]
    pub config: Option<PathBuf>,
}
