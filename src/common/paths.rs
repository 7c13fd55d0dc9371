//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations.

use std::path::PathBuf;

/// Name used for the config directory
const APP_NAME: &str = "plugin-harness";

/// Get the configuration directory path
///
/// - Linux: `~/.config/plugin-harness/`
/// - macOS: `~/Library/Application Support/plugin-harness/`
/// - Windows: `%APPDATA%\plugin-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        }
    }
}
