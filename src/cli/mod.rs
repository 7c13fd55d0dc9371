//! CLI command handling
//!
//! Resolves configuration, loads the suite and hands it to the runner.

use colored::Colorize;

use crate::commands::{Commands, SuiteArgs};
use crate::common::config::Config;
use crate::common::Result;
use crate::plugin::CommandPlugin;
use crate::testing::{
    load_cases, CasePlan, ExecutionMode, FeatureSet, HandlerRegistry, LoadedCase, RunSettings,
    Runner,
};

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when the command ran but some test case did not pass.
pub async fn dispatch(command: Commands, verbose: bool) -> Result<bool> {
    match command {
        Commands::Run {
            suite,
            unknown,
            filter,
        } => {
            let (config, cases) = load_suite(&suite)?;
            let registry =
                HandlerRegistry::load(&config.suite.root, &config.suite.handler_extension)?;
            tracing::debug!(?registry, "handler registry ready");

            let mut plugin = CommandPlugin::new(&config.plugin);
            let settings = RunSettings {
                mode: ExecutionMode::from_live_flag(config.live_enabled()),
                unknown_handlers: unknown.unwrap_or(config.handlers.unknown),
                live: config.live.clone(),
                filter,
                verbose,
            };

            tracing::info!(
                cases = cases.len(),
                mode = %settings.mode,
                suite = %config.suite.root.display(),
                "starting run"
            );

            let mut runner = Runner::new(&registry, &mut plugin, settings);
            let summary = runner.run_all(&cases).await;
            summary.print();

            Ok(summary.success())
        }

        Commands::List { suite } => {
            let (config, cases) = load_suite(&suite)?;
            let registry = HandlerRegistry::new();
            let mut plugin = crate::plugin::NoopPlugin;
            let runner = Runner::new(
                &registry,
                &mut plugin,
                RunSettings {
                    mode: ExecutionMode::from_live_flag(config.live_enabled()),
                    ..Default::default()
                },
            );

            if cases.is_empty() {
                println!("No test cases found");
            }
            for case in &cases {
                match runner.plan(case) {
                    CasePlan::Scheduled { name } => println!("  {} {}", "●".green(), name),
                    CasePlan::Skipped(reason) => println!(
                        "  {} {} {}",
                        "○".dimmed(),
                        crate::testing::group_name(case).dimmed(),
                        format!("({})", reason).dimmed()
                    ),
                }
            }
            Ok(true)
        }
    }
}

/// Merge the config file with command line overrides and load every case
fn load_suite(args: &SuiteArgs) -> Result<(Config, Vec<LoadedCase>)> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(root) = &args.suite {
        config.suite.root = root.clone();
    }
    if let Some(features) = &args.features {
        config.suite.features = Some(features.clone());
    }
    if args.live {
        config.live.enabled = true;
    }

    let features = FeatureSet::load(&config.suite.features_path())?;
    let cases = load_cases(&config.suite.root, &features)?;
    Ok((config, cases))
}
