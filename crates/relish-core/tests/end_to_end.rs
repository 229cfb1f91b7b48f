//! End-to-end runs through the public API: registry in, driver sessions
//! out, aggregated report back.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use relish_core::config::RunConfig;
use relish_core::driver::fake::FakeDriver;
use relish_core::driver::{Driver, DriverFactory};
use relish_core::errors::{EngineError, Result};
use relish_core::matcher::{RegexRegistry, StepContext, StepImpl};
use relish_core::model::{Feature, RunResult, Scenario, ScenarioItem, Status, Step};
use relish_core::report::console;
use relish_core::scheduler::Scheduler;

/// Every session starts with `#dashboard` appearing after two presence
/// polls, which exercises the retry engine on the real (unpaused) clock.
struct ScriptedFactory;

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn open_session(&self) -> anyhow::Result<Arc<dyn Driver>> {
        Ok(Arc::new(
            FakeDriver::new().with_element_after("#dashboard", 2),
        ))
    }
}

struct OpenFrontPage;

#[async_trait]
impl StepImpl for OpenFrontPage {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        ctx.driver.navigate("https://app.example.com").await
    }
}

struct DashboardVisible;

#[async_trait]
impl StepImpl for DashboardVisible {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        if ctx.driver.element_present("#dashboard").await? {
            Ok(())
        } else {
            Err(EngineError::not_yet("dashboard not present"))
        }
    }
}

struct BrokenButton;

#[async_trait]
impl StepImpl for BrokenButton {
    async fn run(&self, _ctx: &mut StepContext<'_>) -> Result<()> {
        Err(EngineError::failed("element detached"))
    }
}

/// Composite step: logs in by issuing two substeps.
struct LogIn;

#[async_trait]
impl StepImpl for LogIn {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        ctx.invoke_text("I open the front page");
        ctx.invoke_text("the dashboard appears");
        Ok(())
    }
}

fn registry() -> Arc<RegexRegistry> {
    let mut reg = RegexRegistry::new();
    reg.register("I open the front page", Arc::new(OpenFrontPage))
        .expect("pattern");
    reg.register_retryable("the dashboard appears", Arc::new(DashboardVisible))
        .expect("pattern");
    reg.register("I press the broken button", Arc::new(BrokenButton))
        .expect("pattern");
    reg.register("I log in", Arc::new(LogIn)).expect("pattern");
    Arc::new(reg)
}

fn scenario(name: &str, tags: &[&str], texts: &[&str]) -> Scenario {
    Scenario {
        name: name.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        steps: texts
            .iter()
            .map(|t| ScenarioItem::Step(Step::new(*t)))
            .collect(),
    }
}

fn config(results_dir: PathBuf) -> RunConfig {
    RunConfig {
        results_dir,
        // Keep retryable waits fast on the integration clock.
        step_timeout_secs: 2,
        step_poll_interval_ms: 25,
        ..RunConfig::default()
    }
}

async fn run(features: &[Feature], config: RunConfig) -> RunResult {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Scheduler {
        matcher: registry(),
        drivers: Arc::new(ScriptedFactory),
        config,
    }
    .run(features)
    .await
    .expect("run")
}

#[tokio::test]
async fn mixed_run_reports_every_category() {
    let features = vec![Feature {
        name: "checkout".into(),
        path: PathBuf::new(),
        scenarios: vec![
            scenario(
                "happy path",
                &[],
                &["I open the front page", "the dashboard appears"],
            ),
            scenario(
                "broken button",
                &[],
                &["I open the front page", "I press the broken button"],
            ),
            scenario("nobody wrote this", &[], &["I defragment the moon"]),
            scenario("switched off", &["disabled"], &["I open the front page"]),
        ],
    }];

    let tmp = tempfile::tempdir().expect("tempdir");
    let result = run(&features, config(tmp.path().join("results"))).await;

    assert!(!result.ok());
    assert_eq!(result.scenarios.passed, 1);
    assert_eq!(result.scenarios.failed, 1);
    assert_eq!(result.scenarios.undefined, 1);
    assert_eq!(result.scenarios.skipped, 1);
    assert_eq!(result.scenarios.total(), 4);
    assert_eq!(result.features.failed, 1);

    // Step tally closes over every declared top-level step.
    assert_eq!(result.steps.total(), 6);
    assert_eq!(result.steps.passed, 3);
    assert_eq!(result.steps.failed, 1);
    assert_eq!(result.steps.undefined, 1);
    assert_eq!(result.steps.skipped, 1);

    // The failing step carries its diagnostic and a screenshot.
    let broken = &result.outcomes[1];
    let failed_step = broken
        .steps
        .iter()
        .find(|s| s.status == Status::Failed)
        .expect("failed step");
    assert!(failed_step.error.as_deref().expect("error").contains("element detached"));
    let shot = failed_step.screenshot.as_ref().expect("screenshot");
    assert!(shot.exists());

    // Machine summary landed next to the scenario directories.
    assert!(tmp.path().join("results/run.json").is_file());
}

#[tokio::test]
async fn report_is_identical_for_one_and_many_workers() {
    let scenarios: Vec<Scenario> = (0..8)
        .map(|i| {
            scenario(
                &format!("scenario {i}"),
                &[],
                &["I open the front page", "the dashboard appears"],
            )
        })
        .collect();
    let features = vec![Feature {
        name: "parallel".into(),
        path: PathBuf::new(),
        scenarios,
    }];

    let tmp = tempfile::tempdir().expect("tempdir");
    let mut shapes = Vec::new();
    for workers in [1, 4] {
        let result = run(
            &features,
            RunConfig {
                workers,
                ..config(tmp.path().join(format!("results-{workers}")))
            },
        )
        .await;
        assert!(result.ok());
        shapes.push(
            result
                .outcomes
                .iter()
                .map(|o| (o.seq, o.scenario_name.clone(), o.status))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(shapes[0], shapes[1]);
}

#[tokio::test]
async fn composite_steps_trace_deep_but_tally_shallow() {
    let features = vec![Feature {
        name: "composite".into(),
        path: PathBuf::new(),
        scenarios: vec![scenario("logs in", &[], &["I log in"])],
    }];

    let tmp = tempfile::tempdir().expect("tempdir");
    let result = run(&features, config(tmp.path().join("results"))).await;

    assert!(result.ok());
    // One top-level step in the tally, three entries in the trace.
    assert_eq!(result.steps.total(), 1);
    let outcome = &result.outcomes[0];
    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(outcome.steps[0].depth, 0);
    assert!(outcome.steps[1..].iter().all(|s| s.depth == 1));

    let lines = console::scenario_lines(outcome);
    assert!(lines.iter().any(|l| l.contains("↳ passed")));
}

#[tokio::test]
async fn summary_wording_matches_the_contract() {
    let features = vec![Feature {
        name: "wording".into(),
        path: PathBuf::new(),
        scenarios: vec![
            scenario("ok", &[], &["I open the front page"]),
            scenario("broken", &[], &["I press the broken button"]),
        ],
    }];

    let tmp = tempfile::tempdir().expect("tempdir");
    let result = run(&features, config(tmp.path().join("results"))).await;

    let lines = console::summary_lines(&result);
    assert_eq!(lines[0], "0 features passed, 1 failed, 0 skipped");
    assert_eq!(lines[1], "1 scenario passed, 1 failed, 0 skipped");
    assert_eq!(lines[2], "1 step passed, 1 failed, 0 skipped, 0 undefined");
}
