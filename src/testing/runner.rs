//! Test runner implementation
//!
//! Executes JSON test cases one after another. Each case gets its own temp
//! directory and backend client, the plugin is activated around its steps,
//! and the steps run in declaration order.

use std::fmt;
use std::path::PathBuf;

use colored::Colorize;

use crate::backend::{BackendClient, Presence};
use crate::common::config::{LiveConfig, UnknownHandlerPolicy};
use crate::common::{Error, Result};
use crate::plugin::{CaseEnv, Plugin};

use super::config::{LoadedCase, Step, StepKind};
use super::mode::{prepare_backend, ExecutionMode};
use super::registry::{HandlerFamily, HandlerRegistry, StepContext};
use super::setup::{translate_kited_setup, translate_paths_setup};

/// Settings shared by every case of a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: ExecutionMode,
    pub unknown_handlers: UnknownHandlerPolicy,
    pub live: LiveConfig,
    /// Only run cases whose name contains this text
    pub filter: Option<String>,
    pub verbose: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Mocked,
            unknown_handlers: UnknownHandlerPolicy::default(),
            live: LiveConfig::default(),
            filter: None,
            verbose: false,
        }
    }
}

/// Why a case does not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `"ignore": true`
    Ignored,
    /// `"live_environment": false` in a mocked run
    LiveOnly,
    /// Excluded by the name filter
    Filtered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Ignored => write!(f, "ignored"),
            SkipReason::LiveOnly => write!(f, "live environment only"),
            SkipReason::Filtered => write!(f, "filtered out"),
        }
    }
}

/// What the runner will do with a discovered case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasePlan {
    Skipped(SkipReason),
    Scheduled { name: String },
}

/// Part of a case that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    /// 1-based step number
    Step(usize),
    Teardown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Setup => write!(f, "setup"),
            Stage::Step(n) => write!(f, "step {}", n),
            Stage::Teardown => write!(f, "teardown"),
        }
    }
}

/// Terminal state of a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Skipped(SkipReason),
    Passed,
    /// An expectation did not hold
    Failed { step: usize, message: String },
    /// The harness, a handler or the backend failed
    Errored { stage: Stage, message: String },
}

impl CaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CaseOutcome::Failed { .. } | CaseOutcome::Errored { .. })
    }
}

/// Result of one case
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub path: PathBuf,
    pub mode: ExecutionMode,
    /// Simulated backend presence, absent for skipped cases
    pub presence: Option<Presence>,
    pub steps_run: usize,
    pub steps_total: usize,
    pub outcome: CaseOutcome,
}

/// Results of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<CaseReport>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Failed { .. }))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Errored { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Skipped(_)))
    }

    /// No case failed or errored
    pub fn success(&self) -> bool {
        !self.reports.iter().any(|r| r.outcome.is_failure())
    }

    fn count(&self, pred: impl Fn(&CaseOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn print(&self) {
        println!(
            "\n{} {} passed, {} failed, {} errored, {} skipped",
            "Summary:".blue().bold(),
            self.passed().to_string().green(),
            self.failed().to_string().red(),
            self.errored().to_string().red(),
            self.skipped().to_string().dimmed()
        );

        for report in self.reports.iter().filter(|r| r.outcome.is_failure()) {
            let detail = match &report.outcome {
                CaseOutcome::Failed { step, message } => format!("step {}: {}", step, message),
                CaseOutcome::Errored { stage, message } => format!("{}: {}", stage, message),
                _ => continue,
            };
            println!("  {} {}\n    {}", "✗".red(), report.name, detail.dimmed());
        }
    }
}

/// Name of the test group a case registers
pub fn group_name(case: &LoadedCase) -> String {
    format!("{} ('{}')", case.case.description, case.path.display())
}

/// Whether a step actually ran
enum StepStatus {
    Executed,
    PassedThrough,
}

/// Runs test cases against a plugin with a fixed handler registry
pub struct Runner<'a> {
    registry: &'a HandlerRegistry,
    plugin: &'a mut dyn Plugin,
    settings: RunSettings,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a HandlerRegistry, plugin: &'a mut dyn Plugin, settings: RunSettings) -> Self {
        Self {
            registry,
            plugin,
            settings,
        }
    }

    /// Decide whether a case runs
    pub fn plan(&self, case: &LoadedCase) -> CasePlan {
        if case.case.ignore {
            return CasePlan::Skipped(SkipReason::Ignored);
        }
        if case.case.live_environment == Some(false) && self.settings.mode == ExecutionMode::Mocked {
            return CasePlan::Skipped(SkipReason::LiveOnly);
        }

        let name = group_name(case);
        if let Some(filter) = &self.settings.filter {
            if !name.contains(filter.as_str()) {
                return CasePlan::Skipped(SkipReason::Filtered);
            }
        }
        CasePlan::Scheduled { name }
    }

    /// Run every case in order
    pub async fn run_all(&mut self, cases: &[LoadedCase]) -> RunSummary {
        let mut summary = RunSummary::default();
        for case in cases {
            summary.reports.push(self.run_case(case).await);
        }
        summary
    }

    /// Run a single case, including its setup and teardown
    pub async fn run_case(&mut self, case: &LoadedCase) -> CaseReport {
        let steps_total = case.case.test.len();
        let mut report = CaseReport {
            name: group_name(case),
            path: case.path.clone(),
            mode: self.settings.mode,
            presence: None,
            steps_run: 0,
            steps_total,
            outcome: CaseOutcome::Passed,
        };

        if let CasePlan::Skipped(reason) = self.plan(case) {
            tracing::debug!(case = %report.name, %reason, "skipping test case");
            if self.settings.verbose || reason != SkipReason::Filtered {
                println!(
                    "\n{} {} {}",
                    "Skipping:".yellow(),
                    report.name.dimmed(),
                    format!("({})", reason).dimmed()
                );
            }
            report.outcome = CaseOutcome::Skipped(reason);
            return report;
        }

        println!(
            "\n{} {} {}",
            "Running Test:".blue().bold(),
            report.name.white().bold(),
            format!("[{}]", self.settings.mode).dimmed()
        );

        let presence = translate_kited_setup(case.case.setup.kited.as_deref());
        report.presence = Some(presence);

        let temp = match tempfile::Builder::new().prefix("harness-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                report.outcome = errored(Stage::Setup, e.into());
                return report;
            }
        };
        let root = temp
            .path()
            .canonicalize()
            .unwrap_or_else(|_| temp.path().to_path_buf());

        let client = match prepare_backend(
            self.settings.mode,
            &case.case,
            presence,
            &root,
            &self.settings.live,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                println!("  {} Setup: {}", "✗".red(), e);
                report.outcome = errored(Stage::Setup, e);
                return report;
            }
        };

        let env = CaseEnv {
            paths: translate_paths_setup(&case.case.setup, || root.clone()),
            root,
            backend_url: client.base_url(),
            presence,
        };

        if self.settings.verbose {
            println!("  Root: {}", env.root.display().to_string().dimmed());
            println!("  Backend: {}", env.backend_url.dimmed());
            println!("  Presence: {}", presence.to_string().dimmed());
        }

        let mut activated = false;
        let setup = match client.install_recorder() {
            Ok(()) => self.plugin.activate(&env).await,
            Err(e) => Err(e),
        };

        match setup {
            Ok(()) => {
                activated = true;
                let (steps_run, outcome) = self.run_steps(case, &client, &env).await;
                report.steps_run = steps_run;
                report.outcome = outcome;
            }
            Err(e) => {
                println!("  {} Setup: {}", "✗".red(), e);
                report.outcome = errored(Stage::Setup, e);
            }
        }

        let teardown = self.teardown(&client, activated).await;
        drop(client);
        if let Err(e) = temp.close() {
            tracing::warn!(root = %env.root.display(), "failed to remove case directory: {}", e);
        }

        if let Err(e) = teardown {
            println!("  {} Teardown: {}", "✗".red(), e);
            if report.outcome == CaseOutcome::Passed {
                report.outcome = errored(Stage::Teardown, e);
            }
        }

        if report.outcome == CaseOutcome::Passed {
            println!("\n{} {}", "✓".green().bold(), "Test Passed".green().bold());
        }

        report
    }

    async fn run_steps(
        &self,
        case: &LoadedCase,
        client: &BackendClient,
        env: &CaseEnv,
    ) -> (usize, CaseOutcome) {
        println!("{}", "Steps:".cyan());

        for (i, step) in case.case.test.iter().enumerate() {
            let step_num = i + 1;

            match self.execute_step(step, client, env).await {
                Ok(StepStatus::Executed) => {
                    println!(
                        "  {} Step {}: {} {}",
                        "✓".green(),
                        step_num,
                        step.step.dimmed(),
                        step.label().dimmed()
                    );
                }
                Ok(StepStatus::PassedThrough) => {
                    println!(
                        "  {} Step {}: {} {} (no handler)",
                        "-".yellow(),
                        step_num,
                        step.step.dimmed(),
                        step.label().dimmed()
                    );
                }
                Err(e) => {
                    println!("  {} Step {}: {}", "✗".red(), step_num, e);
                    let outcome = if e.is_assertion() {
                        CaseOutcome::Failed {
                            step: step_num,
                            message: e.to_string(),
                        }
                    } else {
                        errored(Stage::Step(step_num), e)
                    };
                    return (step_num, outcome);
                }
            }
        }

        (case.case.test.len(), CaseOutcome::Passed)
    }

    /// Dispatch one step to its handler
    async fn execute_step(
        &self,
        step: &Step,
        client: &BackendClient,
        env: &CaseEnv,
    ) -> Result<StepStatus> {
        let (family, not) = match step.kind() {
            Some(StepKind::Action) => (HandlerFamily::Action, false),
            Some(StepKind::Expect) => (HandlerFamily::Expectation, false),
            Some(StepKind::ExpectNot) => (HandlerFamily::Expectation, true),
            None => return self.pass_through(Error::UnknownStepKind(step.step.clone())),
        };

        let Some(handler) = self.registry.get(family, &step.handler) else {
            return self.pass_through(Error::unknown_handler(&family.to_string(), &step.handler));
        };

        tracing::debug!(%family, key = %step.handler, not, "executing step");
        let ctx = StepContext::new(step, family, not, client, env);
        handler.call(&ctx).await?;
        Ok(StepStatus::Executed)
    }

    fn pass_through(&self, error: Error) -> Result<StepStatus> {
        match self.settings.unknown_handlers {
            UnknownHandlerPolicy::Ignore => Ok(StepStatus::PassedThrough),
            UnknownHandlerPolicy::Warn => {
                tracing::warn!("{}; step passes through", error);
                Ok(StepStatus::PassedThrough)
            }
            UnknownHandlerPolicy::Fail => Err(error),
        }
    }

    /// Remove the recorder and deactivate the plugin; both always run
    async fn teardown(&mut self, client: &BackendClient, activated: bool) -> Result<()> {
        let restored = client.restore_recorder();
        let deactivated = if activated {
            self.plugin.deactivate().await
        } else {
            Ok(())
        };
        restored.and(deactivated)
    }
}

fn errored(stage: Stage, error: Error) -> CaseOutcome {
    CaseOutcome::Errored {
        stage,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::NoopPlugin;
    use crate::testing::config::TestCase;

    fn loaded(json: &str) -> LoadedCase {
        LoadedCase {
            path: PathBuf::from("tests/status/case.json"),
            case: serde_json::from_str::<TestCase>(json).unwrap(),
        }
    }

    fn plan_with(mode: ExecutionMode, filter: Option<&str>, json: &str) -> CasePlan {
        let registry = HandlerRegistry::new();
        let mut plugin = NoopPlugin;
        let runner = Runner::new(
            &registry,
            &mut plugin,
            RunSettings {
                mode,
                filter: filter.map(str::to_string),
                ..Default::default()
            },
        );
        runner.plan(&loaded(json))
    }

    #[test]
    fn test_group_name_includes_file() {
        let case = loaded(r#"{"description": "d", "test": []}"#);
        assert_eq!(group_name(&case), "d ('tests/status/case.json')");
    }

    #[test]
    fn test_ignored_case_is_skipped_in_every_mode() {
        let json = r#"{"description": "d", "test": [], "ignore": true}"#;
        for mode in [ExecutionMode::Live, ExecutionMode::Mocked] {
            assert_eq!(plan_with(mode, None, json), CasePlan::Skipped(SkipReason::Ignored));
        }
    }

    #[test]
    fn test_live_only_case_is_skipped_when_mocked() {
        let json = r#"{"description": "d", "test": [], "live_environment": false}"#;
        assert_eq!(
            plan_with(ExecutionMode::Mocked, None, json),
            CasePlan::Skipped(SkipReason::LiveOnly)
        );
        assert!(matches!(
            plan_with(ExecutionMode::Live, None, json),
            CasePlan::Scheduled { .. }
        ));
    }

    #[test]
    fn test_filter_matches_group_name() {
        let json = r#"{"description": "hover shows docs", "test": []}"#;
        assert!(matches!(
            plan_with(ExecutionMode::Mocked, Some("hover"), json),
            CasePlan::Scheduled { .. }
        ));
        assert_eq!(
            plan_with(ExecutionMode::Mocked, Some("signature"), json),
            CasePlan::Skipped(SkipReason::Filtered)
        );
    }

    #[test]
    fn test_summary_counts() {
        let report = |outcome| CaseReport {
            name: "n".into(),
            path: PathBuf::from("p.json"),
            mode: ExecutionMode::Mocked,
            presence: None,
            steps_run: 0,
            steps_total: 0,
            outcome,
        };
        let summary = RunSummary {
            reports: vec![
                report(CaseOutcome::Passed),
                report(CaseOutcome::Skipped(SkipReason::Ignored)),
                report(CaseOutcome::Failed {
                    step: 1,
                    message: "m".into(),
                }),
            ],
        };
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.errored(), 0);
        assert!(!summary.success());
    }
}
