//! Test case configuration types
//!
//! Defines the data structures for deserializing JSON test cases.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A complete test case loaded from a JSON file
#[derive(Deserialize, Debug, Clone)]
pub struct TestCase {
    /// What the test case verifies
    pub description: String,
    /// Simulated backend state and path settings
    #[serde(default)]
    pub setup: Setup,
    /// The sequence of steps to execute, in order
    #[serde(default)]
    pub test: Vec<Step>,
    /// `false` marks a case that cannot run against the mocked backend
    pub live_environment: Option<bool>,
    /// Skip this case entirely
    #[serde(default)]
    pub ignore: bool,
}

/// Declarative setup of a test case
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Setup {
    /// Backend presence keyword, e.g. "authenticated" or "not_running"
    pub kited: Option<String>,
    /// Paths the backend should include, relative to the case root
    pub whitelist: Option<Vec<String>>,
    /// Paths the backend should exclude, relative to the case root
    pub blacklist: Option<Vec<String>>,
    /// Paths the backend should ignore, relative to the case root
    pub ignored: Option<Vec<String>>,
}

/// The kinds of step a test case can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Action,
    Expect,
    ExpectNot,
}

impl StepKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "action" => Some(StepKind::Action),
            "expect" => Some(StepKind::Expect),
            "expect_not" => Some(StepKind::ExpectNot),
            _ => None,
        }
    }
}

/// A single step of a test case
///
/// Fields other than `step`, `type` and `description` belong to the handler
/// and are kept as raw JSON.
#[derive(Deserialize, Debug, Clone)]
pub struct Step {
    /// "action", "expect" or "expect_not"
    pub step: String,
    /// Handler key
    #[serde(rename = "type")]
    pub handler: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Handler-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Step {
    /// The step kind, if it is one the harness knows
    pub fn kind(&self) -> Option<StepKind> {
        StepKind::parse(&self.step)
    }

    /// Label used in reports
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.handler
        } else {
            &self.description
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(Value::as_u64)
    }

    /// The step as the JSON object it was declared as
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("step".to_string(), Value::String(self.step.clone()));
        object.insert("type".to_string(), Value::String(self.handler.clone()));
        object.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        Value::Object(object)
    }
}

/// A test case together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedCase {
    pub path: PathBuf,
    pub case: TestCase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_case() {
        let case: TestCase = serde_json::from_str(
            r#"{
                "description": "shows the status",
                "setup": {"kited": "authenticated", "whitelist": ["project"]},
                "test": [
                    {"step": "action", "type": "new_file", "description": "create", "file": "a.py", "content": "x"},
                    {"step": "expect_not", "type": "request", "path": "/clientapi/plan"}
                ],
                "live_environment": false
            }"#,
        )
        .unwrap();

        assert_eq!(case.description, "shows the status");
        assert_eq!(case.setup.kited.as_deref(), Some("authenticated"));
        assert_eq!(case.setup.whitelist, Some(vec!["project".to_string()]));
        assert!(case.setup.blacklist.is_none());
        assert_eq!(case.live_environment, Some(false));
        assert!(!case.ignore);

        assert_eq!(case.test.len(), 2);
        let first = &case.test[0];
        assert_eq!(first.kind(), Some(StepKind::Action));
        assert_eq!(first.handler, "new_file");
        assert_eq!(first.str_field("file"), Some("a.py"));
        assert!(first.field("step").is_none());

        let second = &case.test[1];
        assert_eq!(second.kind(), Some(StepKind::ExpectNot));
        assert_eq!(second.label(), "request");
    }

    #[test]
    fn test_missing_setup_defaults_to_empty() {
        let case: TestCase =
            serde_json::from_str(r#"{"description": "d", "test": []}"#).unwrap();
        assert!(case.setup.kited.is_none());
        assert!(case.live_environment.is_none());
    }

    #[test]
    fn test_unknown_step_kind_is_preserved() {
        let step: Step =
            serde_json::from_str(r#"{"step": "comment", "type": "note"}"#).unwrap();
        assert_eq!(step.kind(), None);
        assert_eq!(step.step, "comment");
    }

    #[test]
    fn test_to_json_restores_declared_fields() {
        let step: Step = serde_json::from_str(
            r#"{"step": "action", "type": "wait", "description": "pause", "ms": 5}"#,
        )
        .unwrap();
        let json = step.to_json();
        assert_eq!(json["step"], "action");
        assert_eq!(json["type"], "wait");
        assert_eq!(json["ms"], 5);
    }
}
