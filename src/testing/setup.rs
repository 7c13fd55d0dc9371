//! Translation of declarative case setup into mock backend configuration

use std::path::{Component, Path, PathBuf};

use crate::backend::{PathsConfig, Presence};

use super::config::Setup;

/// Accepted values of `setup.kited`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupKeyword {
    Authenticated,
    Unsupported,
    Uninstalled,
    NotRunning,
    Unreachable,
    Unlogged,
    /// Absent or not one of the above
    Unrecognized(Option<String>),
}

impl SetupKeyword {
    pub fn parse(keyword: Option<&str>) -> Self {
        match keyword {
            Some("authenticated") => SetupKeyword::Authenticated,
            Some("unsupported" | "not_supported") => SetupKeyword::Unsupported,
            Some("uninstalled" | "not_installed") => SetupKeyword::Uninstalled,
            Some("not_running") => SetupKeyword::NotRunning,
            Some("unreachable" | "not_reachable") => SetupKeyword::Unreachable,
            Some("unlogged" | "not_logged") => SetupKeyword::Unlogged,
            other => SetupKeyword::Unrecognized(other.map(str::to_string)),
        }
    }

    /// A keyword that was given but is not one of the accepted values
    pub fn unrecognized(&self) -> Option<&str> {
        match self {
            SetupKeyword::Unrecognized(Some(other)) if !other.is_empty() => Some(other),
            _ => None,
        }
    }

    pub fn presence(&self) -> Presence {
        let mut presence = Presence::default();
        match self {
            SetupKeyword::Authenticated => presence.logged = Some(true),
            SetupKeyword::Unsupported => presence.supported = Some(false),
            SetupKeyword::Uninstalled => presence.installed = Some(false),
            SetupKeyword::NotRunning => presence.running = Some(false),
            SetupKeyword::Unreachable => presence.reachable = Some(false),
            SetupKeyword::Unlogged => presence.logged = Some(false),
            SetupKeyword::Unrecognized(_) => presence.supported = Some(false),
        }
        presence
    }
}

/// Presence descriptor for a `setup.kited` keyword
///
/// Unknown or missing keywords fall back to an unsupported backend.
pub fn translate_kited_setup(keyword: Option<&str>) -> Presence {
    let parsed = SetupKeyword::parse(keyword);
    if let Some(other) = parsed.unrecognized() {
        tracing::warn!(
            keyword = %other,
            "unrecognized setup keyword, simulating an unsupported backend"
        );
    }
    parsed.presence()
}

/// Absolute path configuration for the mock backend
///
/// Entries always land under the root: leading separators are dropped and
/// `..` never climbs above it. `root` is only consulted when at least one
/// list is present, since the case root does not exist until the case's
/// temp directory is created.
pub fn translate_paths_setup<F>(setup: &Setup, root: F) -> PathsConfig
where
    F: Fn() -> PathBuf,
{
    let resolve = |entries: &Option<Vec<String>>| {
        entries
            .as_ref()
            .map(|list| list.iter().map(|p| join_under(&root(), p)).collect::<Vec<_>>())
    };

    PathsConfig {
        whitelist: resolve(&setup.whitelist),
        blacklist: resolve(&setup.blacklist),
        ignored: resolve(&setup.ignored),
    }
}

fn join_under(root: &Path, entry: &str) -> PathBuf {
    let mut relative = PathBuf::new();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::ParentDir => {
                relative.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    root.join(relative)
}
