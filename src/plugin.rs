//! Lifecycle of the plugin under test
//!
//! The harness activates the plugin before the steps of a test case run and
//! deactivates it afterwards, whatever the outcome.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;

use crate::backend::{PathsConfig, Presence};
use crate::common::config::PluginConfig;
use crate::common::{Error, Result};

/// Case root directory
pub const ROOT_VAR: &str = "HARNESS_ROOT";
/// URL of the case's backend server
pub const BACKEND_URL_VAR: &str = "HARNESS_BACKEND_URL";
/// Simulated presence, as sparse JSON
pub const PRESENCE_VAR: &str = "HARNESS_PRESENCE";
/// Path settings, as JSON
pub const PATHS_VAR: &str = "HARNESS_PATHS";

/// What the plugin and handler scripts know about the running case
#[derive(Debug, Clone)]
pub struct CaseEnv {
    pub root: PathBuf,
    pub backend_url: String,
    pub presence: Presence,
    pub paths: PathsConfig,
}

impl CaseEnv {
    /// Environment variables exported to child processes
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            (ROOT_VAR, self.root.display().to_string()),
            (BACKEND_URL_VAR, self.backend_url.clone()),
            (PRESENCE_VAR, self.presence.to_string()),
            (
                PATHS_VAR,
                serde_json::to_string(&self.paths).unwrap_or_else(|_| "{}".to_string()),
            ),
        ]
    }
}

/// Locate `sh` for running commands and scripts
pub(crate) fn shell() -> Result<PathBuf> {
    which::which("sh").map_err(|e| Error::Config(format!("Cannot find 'sh': {}", e)))
}

/// A plugin the harness can switch on and off around each test case
#[async_trait]
pub trait Plugin: Send {
    /// Activate the plugin for a case whose files live under `env.root`
    async fn activate(&mut self, env: &CaseEnv) -> Result<()>;

    /// Deactivate the plugin
    async fn deactivate(&mut self) -> Result<()>;
}

/// Plugin with no lifecycle of its own
#[derive(Debug, Default)]
pub struct NoopPlugin;

#[async_trait]
impl Plugin for NoopPlugin {
    async fn activate(&mut self, _env: &CaseEnv) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Plugin driven by shell commands
///
/// Both commands are optional. The case is described to them through the
/// `HARNESS_*` environment variables of [`CaseEnv::vars`].
#[derive(Debug, Default)]
pub struct CommandPlugin {
    activate: Option<String>,
    deactivate: Option<String>,
    env: Option<CaseEnv>,
}

impl CommandPlugin {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            activate: config.activate.clone(),
            deactivate: config.deactivate.clone(),
            env: None,
        }
    }

    async fn run(&self, phase: &str, command: &str) -> Result<()> {
        tracing::debug!(phase, command, "running plugin command");

        let mut cmd = TokioCommand::new(shell()?);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(env) = &self.env {
            cmd.envs(env.vars());
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Plugin(format!("{} command failed to execute: {}", phase, e)))?;

        if !output.status.success() {
            return Err(Error::Plugin(format!(
                "{} command '{}' failed with exit code {:?}: {}",
                phase,
                command,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    async fn activate(&mut self, env: &CaseEnv) -> Result<()> {
        self.env = Some(env.clone());
        match self.activate.clone() {
            Some(command) => self.run("activate", &command).await,
            None => Ok(()),
        }
    }

    async fn deactivate(&mut self) -> Result<()> {
        let result = match self.deactivate.clone() {
            Some(command) => self.run("deactivate", &command).await,
            None => Ok(()),
        };
        self.env = None;
        result
    }
}
