//! JSON test runner
//!
//! Loads JSON test cases from a suite directory, dispatches their steps to
//! registered action and expectation handlers, and drives the plugin and
//! backend around each case.

mod config;
mod handlers;
mod loader;
mod mode;
mod registry;
mod runner;
mod script;
mod setup;

pub use config::*;
pub use loader::{discover_case_files, load_case, load_cases, FeatureSet};
pub use mode::{prepare_backend, ExecutionMode};
pub use registry::{FnHandler, Handler, HandlerFamily, HandlerRegistry, StepContext};
pub use runner::{
    group_name, CaseOutcome, CasePlan, CaseReport, RunSettings, RunSummary, Runner, SkipReason,
    Stage,
};
pub use script::ScriptHandler;
pub use setup::{translate_kited_setup, translate_paths_setup, SetupKeyword};
