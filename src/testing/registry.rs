//! Handler registry
//!
//! Maps the `type` of a step to the code that performs it. Actions and
//! expectations live in two separate maps. The registry is built once
//! before the run and only read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::backend::BackendClient;
use crate::common::{Error, Result};
use crate::plugin::CaseEnv;

use super::config::Step;
use super::handlers;
use super::script::ScriptHandler;

/// Which map a handler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerFamily {
    Action,
    Expectation,
}

impl HandlerFamily {
    /// Directory of the suite that holds scripts of this family
    pub fn dir_name(&self) -> &'static str {
        match self {
            HandlerFamily::Action => "actions",
            HandlerFamily::Expectation => "expectations",
        }
    }
}

impl fmt::Display for HandlerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFamily::Action => write!(f, "action"),
            HandlerFamily::Expectation => write!(f, "expectation"),
        }
    }
}

/// Everything a handler gets to see while running one step
pub struct StepContext<'a> {
    pub step: &'a Step,
    pub family: HandlerFamily,
    /// Expectation must not hold (`expect_not` steps)
    pub not: bool,
    pub client: &'a BackendClient,
    env: &'a CaseEnv,
}

impl<'a> StepContext<'a> {
    pub fn new(
        step: &'a Step,
        family: HandlerFamily,
        not: bool,
        client: &'a BackendClient,
        env: &'a CaseEnv,
    ) -> Self {
        Self {
            step,
            family,
            not,
            client,
            env,
        }
    }

    /// Root directory of the running case
    pub fn root(&self) -> &Path {
        &self.env.root
    }

    /// The running case as exported to child processes
    pub fn env(&self) -> &CaseEnv {
        self.env
    }

    /// Resolve a path relative to the case root
    ///
    /// Absolute paths and `..` components are rejected so handlers cannot
    /// touch files outside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let inside = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside {
            return Err(Error::handler_failed(
                &self.step.handler,
                format!("path '{}' must be relative to the case root", relative),
            ));
        }
        Ok(self.env.root.join(path))
    }

    /// A string field the handler cannot do without
    pub fn required_str(&self, name: &str) -> Result<&'a str> {
        self.step.str_field(name).ok_or_else(|| {
            Error::handler_failed(
                &self.step.handler,
                format!("missing string field '{}'", name),
            )
        })
    }

    /// Assert `holds`, inverted for `expect_not` steps
    pub fn check(&self, holds: bool, what: impl FnOnce() -> String) -> Result<()> {
        match (holds, self.not) {
            (true, false) | (false, true) => Ok(()),
            (false, false) => Err(Error::TestAssertion(format!("expected {}", what()))),
            (true, true) => Err(Error::TestAssertion(format!("expected not {}", what()))),
        }
    }
}

/// Code behind an action or expectation type
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()>;
}

/// Adapter turning a synchronous closure into a handler
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&StepContext<'_>) -> Result<()> + Send + Sync,
{
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Action and expectation handlers keyed by step `type`
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    actions: HashMap<String, Arc<dyn Handler>>,
    expectations: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        handlers::register_builtins(&mut registry);
        registry
    }

    /// Built-in handlers plus the scripts found under the suite's
    /// `actions/` and `expectations/` directories
    pub fn load(suite_root: &Path, extension: &str) -> Result<Self> {
        let mut registry = Self::with_builtins();
        for family in [HandlerFamily::Action, HandlerFamily::Expectation] {
            let dir = suite_root.join(family.dir_name());
            if dir.is_dir() {
                let count = registry.scan(&dir, family, extension)?;
                tracing::debug!(%family, count, dir = %dir.display(), "registered handler scripts");
            }
        }
        Ok(registry)
    }

    /// Register every file under `dir` with the given extension, keyed by
    /// its base name; a later file with the same base name replaces an
    /// earlier one
    pub fn scan(&mut self, dir: &Path, family: HandlerFamily, extension: &str) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::file_read(dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            self.register(family, key, Arc::new(ScriptHandler::new(path, family)));
            count += 1;
        }
        Ok(count)
    }

    pub fn register(&mut self, family: HandlerFamily, key: impl Into<String>, handler: Arc<dyn Handler>) {
        let key = key.into();
        let previous = self.map_mut(family).insert(key.clone(), handler);
        if previous.is_some() {
            tracing::debug!(%family, %key, "handler replaced");
        }
    }

    pub fn register_action(&mut self, key: impl Into<String>, handler: impl Handler + 'static) {
        self.register(HandlerFamily::Action, key, Arc::new(handler));
    }

    pub fn register_expectation(&mut self, key: impl Into<String>, handler: impl Handler + 'static) {
        self.register(HandlerFamily::Expectation, key, Arc::new(handler));
    }

    pub fn get(&self, family: HandlerFamily, key: &str) -> Option<Arc<dyn Handler>> {
        self.map(family).get(key).cloned()
    }

    /// Registered keys of a family, sorted
    pub fn keys(&self, family: HandlerFamily) -> Vec<&str> {
        let mut keys: Vec<&str> = self.map(family).keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn map(&self, family: HandlerFamily) -> &HashMap<String, Arc<dyn Handler>> {
        match family {
            HandlerFamily::Action => &self.actions,
            HandlerFamily::Expectation => &self.expectations,
        }
    }

    fn map_mut(&mut self, family: HandlerFamily) -> &mut HashMap<String, Arc<dyn Handler>> {
        match family {
            HandlerFamily::Action => &mut self.actions,
            HandlerFamily::Expectation => &mut self.expectations,
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.keys(HandlerFamily::Action))
            .field("expectations", &self.keys(HandlerFamily::Expectation))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn call(&self, _ctx: &StepContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_families_are_independent() {
        let mut registry = HandlerRegistry::new();
        registry.register_action("open", Noop);

        assert!(registry.get(HandlerFamily::Action, "open").is_some());
        assert!(registry.get(HandlerFamily::Expectation, "open").is_none());
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.keys(HandlerFamily::Action).contains(&"new_file"));
        assert!(registry.keys(HandlerFamily::Expectation).contains(&"request"));
    }

    #[test]
    fn test_scan_keys_by_base_name() {
        let temp = tempdir().unwrap();
        let actions = temp.path().join("actions");
        fs::create_dir_all(actions.join("editor")).unwrap();
        fs::write(actions.join("open_file.sh"), "exit 0").unwrap();
        fs::write(actions.join("editor/type_text.sh"), "exit 0").unwrap();
        fs::write(actions.join("README.md"), "").unwrap();

        let registry = HandlerRegistry::load(temp.path(), "sh").unwrap();
        let keys = registry.keys(HandlerFamily::Action);
        assert!(keys.contains(&"open_file"));
        assert!(keys.contains(&"type_text"));
        assert!(!keys.contains(&"README"));
        assert!(registry.get(HandlerFamily::Expectation, "open_file").is_none());
    }

    #[test]
    fn test_scan_overrides_builtin_with_same_name() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("expectations");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("file_exists.sh"), "exit 0").unwrap();

        let builtin = HandlerRegistry::with_builtins();
        let loaded = HandlerRegistry::load(temp.path(), "sh").unwrap();

        let a = builtin.get(HandlerFamily::Expectation, "file_exists").unwrap();
        let b = loaded.get(HandlerFamily::Expectation, "file_exists").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(
            builtin.keys(HandlerFamily::Expectation),
            loaded.keys(HandlerFamily::Expectation)
        );
    }
}
