//! Discovery and parsing of JSON test cases

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::common::{Error, Result};

use super::config::{LoadedCase, TestCase};

/// Ordered list of feature directories to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet(pub Vec<String>);

impl FeatureSet {
    /// Load a feature set from a JSON array of names
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let names: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Invalid feature set '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self(names))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Find every test case file for the given features
///
/// Files are returned feature by feature, in file-name order within each
/// feature directory (`<suite>/tests/<feature>/**/*.json`). A directory that
/// cannot be walked is an error rather than a silently shorter run.
pub fn discover_case_files(suite_root: &Path, features: &FeatureSet) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    for feature in features.iter() {
        let dir = suite_root.join("tests").join(feature);
        if !dir.is_dir() {
            tracing::warn!(feature, dir = %dir.display(), "feature directory not found");
            continue;
        }

        let before = out.len();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                Error::file_read(&path, e)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            out.push(path);
        }
        tracing::debug!(feature, count = out.len() - before, "discovered test cases");
    }

    Ok(out)
}

/// Parse a single test case file
pub fn load_case(path: &Path) -> Result<LoadedCase> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    let case: TestCase = serde_json::from_str(&content).map_err(|e| Error::TestCaseParse {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    Ok(LoadedCase {
        path: path.to_path_buf(),
        case,
    })
}

/// Discover and parse every test case; the first malformed file aborts
pub fn load_cases(suite_root: &Path, features: &FeatureSet) -> Result<Vec<LoadedCase>> {
    discover_case_files(suite_root, features)?
        .iter()
        .map(|path| load_case(path))
        .collect()
}
