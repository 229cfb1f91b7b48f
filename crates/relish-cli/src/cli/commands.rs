use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use relish_core::config::RunConfig;
use relish_core::driver::fake::FakeDriverFactory;
use relish_core::matcher::{RegexRegistry, RetryMode};
use relish_core::model::Feature;
use relish_core::report::console;
use relish_core::scheduler::Scheduler;

use crate::cli::args::{CheckArgs, Cli, Command, RunArgs};
use crate::exit_codes;
use crate::steps;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run(args).await,
        Command::Check(args) => check(&args),
        Command::Steps => list_steps(),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = apply_overrides(load_config(args.config.as_deref())?, &args);
    config.validate()?;
    let features = load_features(&args.features)?;

    let scheduler = Scheduler {
        matcher: Arc::new(steps::registry()?),
        // In-memory session backend; real driver backends plug in through
        // the library API.
        drivers: Arc::new(FakeDriverFactory),
        config,
    };
    let result = scheduler.run(&features).await?;
    console::print_report(&result);
    Ok(if result.ok() {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILED
    })
}

fn check(args: &CheckArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;
    let features = load_features(&args.features)?;
    let scenarios: usize = features.iter().map(|f| f.scenarios.len()).sum();
    let step_count: usize = features
        .iter()
        .flat_map(|f| &f.scenarios)
        .map(|s| s.step_count())
        .sum();
    eprintln!(
        "{} features, {scenarios} scenarios, {step_count} steps: OK",
        features.len()
    );
    Ok(exit_codes::SUCCESS)
}

fn list_steps() -> anyhow::Result<i32> {
    for line in inventory_lines(&steps::registry()?) {
        eprintln!("{line}");
    }
    Ok(exit_codes::SUCCESS)
}

/// One line per registered pattern, in match-priority order; retried
/// steps are marked so authors know which ones poll.
fn inventory_lines(registry: &RegexRegistry) -> Vec<String> {
    registry
        .patterns()
        .map(|(pattern, retry)| match retry {
            RetryMode::Never => pattern.to_string(),
            RetryMode::RunDefault | RetryMode::Policy(_) => format!("{pattern}  [retried]"),
        })
        .collect()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(p) => RunConfig::from_yaml_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(RunConfig::default()),
    }
}

fn apply_overrides(mut config: RunConfig, args: &RunArgs) -> RunConfig {
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if args.fail_fast {
        config.fail_fast = true;
    }
    if let Some(results) = &args.results {
        config.results_dir = results.clone();
    }
    if args.reuse_results {
        config.reuse_results = true;
    }
    if !args.skip_tags.is_empty() {
        config.skip_tags = args.skip_tags.iter().cloned().collect();
    }
    if let Some(secs) = args.step_timeout {
        config.step_timeout_secs = secs;
    }
    if let Some(ms) = args.poll_interval {
        config.step_poll_interval_ms = ms;
    }
    config
}

/// One feature document per file, run in the order given on the command
/// line.
fn load_features(paths: &[PathBuf]) -> anyhow::Result<Vec<Feature>> {
    paths
        .iter()
        .map(|path| {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let mut feature: Feature = serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            feature.path = path.clone();
            debug!(feature = %feature.name, scenarios = feature.scenarios.len(), "loaded");
            Ok(feature)
        })
        .collect()
}
