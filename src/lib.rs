//! Plugin test harness
//!
//! Runs data-driven JSON test cases against an editor plugin, with its
//! backend service either mocked in-process or live.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod common;
pub mod plugin;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use plugin::{CaseEnv, CommandPlugin, NoopPlugin, Plugin};
