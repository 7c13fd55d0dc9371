//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Environment variable that switches the harness into live mode
pub const LIVE_ENV_VAR: &str = "HARNESS_LIVE";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Test suite location
    #[serde(default)]
    pub suite: SuiteConfig,

    /// Live backend settings
    #[serde(default)]
    pub live: LiveConfig,

    /// Step dispatch settings
    #[serde(default)]
    pub handlers: HandlersConfig,

    /// Plugin lifecycle commands
    #[serde(default)]
    pub plugin: PluginConfig,
}

/// What to do when a step names a handler (or step kind) nobody registered
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnknownHandlerPolicy {
    /// Pass through silently
    Ignore,
    /// Pass through and log a warning
    #[default]
    Warn,
    /// Error the test case
    Fail,
}

/// Suite settings
#[derive(Debug, Deserialize)]
pub struct SuiteConfig {
    /// Directory holding `tests/`, `actions/` and `expectations/`
    #[serde(default = "default_suite_root")]
    pub root: PathBuf,

    /// Feature-set file; defaults to `<root>/feature-set.json`
    #[serde(default)]
    pub features: Option<PathBuf>,

    /// Extension of handler scripts, without the dot
    #[serde(default = "default_handler_extension")]
    pub handler_extension: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            root: default_suite_root(),
            features: None,
            handler_extension: default_handler_extension(),
        }
    }
}

impl SuiteConfig {
    /// Resolve the feature-set file path
    pub fn features_path(&self) -> PathBuf {
        self.features
            .clone()
            .unwrap_or_else(|| self.root.join("feature-set.json"))
    }
}

fn default_suite_root() -> PathBuf {
    PathBuf::from("test/json")
}

fn default_handler_extension() -> String {
    "sh".to_string()
}

/// Live backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Run against a live backend instead of the mock
    #[serde(default)]
    pub enabled: bool,

    /// Backend host
    #[serde(default = "default_live_host")]
    pub host: String,

    /// Backend port
    #[serde(default = "default_live_port")]
    pub port: u16,

    /// Timeout for a single backend request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_live_host(),
            port: default_live_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LiveConfig {
    /// URL of the live service
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_live_host() -> String {
    "localhost".to_string()
}
fn default_live_port() -> u16 {
    56624
}
fn default_request_timeout() -> u64 {
    30
}

/// Step dispatch settings
#[derive(Debug, Deserialize, Default)]
pub struct HandlersConfig {
    #[serde(default)]
    pub unknown: UnknownHandlerPolicy,
}

/// Shell commands run around each test case
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PluginConfig {
    /// Command run when the plugin is activated
    pub activate: Option<String>,
    /// Command run when the plugin is deactivated
    pub deactivate: Option<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| super::Error::file_read(path, e))?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Whether live mode is on, from the file or the environment
    pub fn live_enabled(&self) -> bool {
        self.live.enabled || env_flag(LIVE_ENV_VAR)
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
