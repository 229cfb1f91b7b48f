//! Parallel scenario scheduler.
//!
//! Scenarios are the unit of parallelism. A shared work queue feeds N
//! workers; each worker owns an isolated driver session and runs one
//! scenario at a time to completion. Arrival order of results is whatever
//! the workers produce; the aggregator re-sorts by declaration order, so
//! the report is identical for any worker count.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::driver::DriverFactory;
use crate::matcher::StepMatcher;
use crate::model::{Feature, RunResult, ScenarioOutcome, Status};
use crate::report;
use crate::results::ResultsArea;
use crate::retry::cancel_pair;
use crate::scenario::{aborted_outcome, ScenarioRunner, ScenarioUnit};

pub struct Scheduler {
    pub matcher: Arc<dyn StepMatcher>,
    pub drivers: Arc<dyn DriverFactory>,
    pub config: RunConfig,
}

impl Scheduler {
    /// Run every scenario of `features` and aggregate the outcome.
    ///
    /// Fails only on infrastructure problems (bad config, results dir,
    /// driver sessions, worker panics). Scenario failures are data in the
    /// returned [`RunResult`], never an `Err`.
    pub async fn run(&self, features: &[Feature]) -> anyhow::Result<RunResult> {
        self.config.validate()?;
        let default_retry = self.config.retry_policy()?;
        let started = Instant::now();

        let units = flatten(features);
        let total = units.len();
        let worker_count = self.config.workers.min(total).max(1);
        info!(
            features = features.len(),
            scenarios = total,
            workers = worker_count,
            dry_run = self.config.dry_run,
            "run started"
        );

        // Dry-run writes nothing, so it claims no results directory either.
        let area: Arc<Option<ResultsArea>> = if self.config.dry_run {
            Arc::new(None)
        } else {
            Arc::new(Some(ResultsArea::prepare(
                self.config.results_dir.clone(),
                self.config.reuse_results,
            )?))
        };

        let queue = Arc::new(Mutex::new(units.into_iter().collect::<VecDeque<_>>()));
        let dispatch_open = Arc::new(AtomicBool::new(true));
        let (cancel_src, cancel) = cancel_pair();
        let cancel_src = Arc::new(cancel_src);

        let mut workers: JoinSet<anyhow::Result<Vec<ScenarioOutcome>>> = JoinSet::new();
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let dispatch_open = Arc::clone(&dispatch_open);
            let cancel_src = Arc::clone(&cancel_src);
            let cancel = cancel.clone();
            let area = Arc::clone(&area);
            let matcher = Arc::clone(&self.matcher);
            let factory = Arc::clone(&self.drivers);
            let skip_tags = self.config.skip_tags.clone();
            let dry_run = self.config.dry_run;
            let fail_fast = self.config.fail_fast;

            workers.spawn(async move {
                let driver = if dry_run {
                    None
                } else {
                    Some(
                        factory
                            .open_session()
                            .await
                            .with_context(|| format!("worker {worker_id}: open driver session"))?,
                    )
                };
                let runner = ScenarioRunner {
                    matcher,
                    driver,
                    skip_tags,
                    dry_run,
                    default_retry,
                    cancel,
                };

                let mut completed = Vec::new();
                loop {
                    let unit = if dispatch_open.load(Ordering::SeqCst) {
                        queue.lock().await.pop_front()
                    } else {
                        None
                    };
                    let Some(unit) = unit else { break };

                    let outcome = runner.run(&unit, area.as_ref().as_ref()).await;
                    let failed =
                        matches!(outcome.status, Status::Failed | Status::Undefined);
                    completed.push(outcome);

                    if failed && fail_fast {
                        warn!(worker_id, "stop-on-failure: closing dispatch");
                        dispatch_open.store(false, Ordering::SeqCst);
                        cancel_src.cancel();
                    }
                }
                Ok(completed)
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            let completed = joined.context("scenario worker panicked")??;
            outcomes.extend(completed);
        }

        // Anything still queued was cut off by stop-on-failure.
        let mut leftovers = queue.lock().await;
        while let Some(unit) = leftovers.pop_front() {
            outcomes.push(aborted_outcome(&unit));
        }
        drop(leftovers);

        let result = report::aggregate(
            outcomes,
            features.len(),
            started.elapsed(),
            worker_count,
            self.config.dry_run,
        );
        if let Some(area) = area.as_ref() {
            report::json::write_run_summary(area.root(), &result)?;
        }
        info!(
            passed = result.scenarios.passed,
            failed = result.scenarios.failed,
            skipped = result.scenarios.skipped,
            undefined = result.scenarios.undefined,
            untested = result.scenarios.untested,
            "run finished"
        );
        Ok(result)
    }
}

/// Declaration-ordered dispatch list: features in file order, scenarios in
/// feature order, each tagged with a global sequence index.
fn flatten(features: &[Feature]) -> Vec<ScenarioUnit> {
    let mut units = Vec::new();
    for (feature_index, feature) in features.iter().enumerate() {
        for scenario in &feature.scenarios {
            units.push(ScenarioUnit {
                seq: units.len(),
                feature_index,
                feature_name: feature.name.clone(),
                scenario: scenario.clone(),
            });
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;
    use crate::driver::fake::FakeDriverFactory;
    use crate::errors::{EngineError, Result};
    use crate::matcher::{RegexRegistry, StepContext, StepImpl};
    use crate::model::{Scenario, ScenarioItem, Step};

    struct Pass;

    #[async_trait]
    impl StepImpl for Pass {
        async fn run(&self, _ctx: &mut StepContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl StepImpl for Fail {
        async fn run(&self, _ctx: &mut StepContext<'_>) -> Result<()> {
            Err(EngineError::failed("boom"))
        }
    }

    fn registry() -> RegexRegistry {
        let mut reg = RegexRegistry::new();
        reg.register("I pass", Arc::new(Pass)).unwrap();
        reg.register("I fail", Arc::new(Fail)).unwrap();
        reg
    }

    fn scenario(name: &str, texts: &[&str]) -> Scenario {
        Scenario {
            name: name.into(),
            tags: vec![],
            steps: texts
                .iter()
                .map(|t| ScenarioItem::Step(Step::new(*t)))
                .collect(),
        }
    }

    fn feature(name: &str, scenarios: Vec<Scenario>) -> Feature {
        Feature {
            name: name.into(),
            path: PathBuf::new(),
            scenarios,
        }
    }

    fn scheduler(config: RunConfig) -> Scheduler {
        Scheduler {
            matcher: Arc::new(registry()),
            drivers: Arc::new(FakeDriverFactory),
            config,
        }
    }

    #[tokio::test]
    async fn report_order_is_declaration_order_for_any_worker_count() {
        let features = vec![
            feature(
                "alpha",
                (0..6).map(|i| scenario(&format!("a{i}"), &["I pass"])).collect(),
            ),
            feature(
                "beta",
                (0..6).map(|i| scenario(&format!("b{i}"), &["I pass"])).collect(),
            ),
        ];

        let tmp = tempfile::tempdir().unwrap();
        let mut names_by_workers = Vec::new();
        for workers in [1, 4] {
            let s = scheduler(RunConfig {
                workers,
                results_dir: tmp.path().join(format!("results-{workers}")),
                ..RunConfig::default()
            });
            let result = s.run(&features).await.unwrap();
            assert!(result.ok());
            names_by_workers.push(
                result
                    .outcomes
                    .iter()
                    .map(|o| o.scenario_name.clone())
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(names_by_workers[0], names_by_workers[1]);
        assert_eq!(names_by_workers[0][0], "a0");
        assert_eq!(names_by_workers[0][11], "b5");
    }

    #[tokio::test]
    async fn failures_are_data_not_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let s = scheduler(RunConfig {
            results_dir: tmp.path().join("results"),
            ..RunConfig::default()
        });
        let features = vec![feature(
            "f",
            vec![scenario("good", &["I pass"]), scenario("bad", &["I fail"])],
        )];

        let result = s.run(&features).await.unwrap();
        assert!(!result.ok());
        assert_eq!(result.scenarios.passed, 1);
        assert_eq!(result.scenarios.failed, 1);
        assert_eq!(result.features.failed, 1);
    }

    #[tokio::test]
    async fn fail_fast_skips_undispatched_scenarios() {
        let tmp = tempfile::tempdir().unwrap();
        let s = scheduler(RunConfig {
            fail_fast: true,
            results_dir: tmp.path().join("results"),
            ..RunConfig::default()
        });
        let features = vec![feature(
            "f",
            vec![
                scenario("bad", &["I fail"]),
                scenario("never-a", &["I pass"]),
                scenario("never-b", &["I pass"]),
            ],
        )];

        let result = s.run(&features).await.unwrap();
        assert_eq!(result.scenarios.failed, 1);
        assert_eq!(result.scenarios.skipped, 2);
        assert_eq!(result.scenarios.total(), 3);
        // Skipped-by-abort scenarios keep their declared steps in the tally.
        assert_eq!(result.outcomes[1].steps.len(), 1);
        assert_eq!(result.outcomes[1].steps[0].status, Status::Skipped);
    }

    #[tokio::test]
    async fn dry_run_creates_no_results_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("results");
        let s = scheduler(RunConfig {
            dry_run: true,
            results_dir: results.clone(),
            ..RunConfig::default()
        });
        let features = vec![feature("f", vec![scenario("x", &["I pass"])])];

        let result = s.run(&features).await.unwrap();
        assert!(result.ok());
        assert_eq!(result.scenarios.untested, 1);
        assert!(!results.exists());
    }

    #[tokio::test]
    async fn run_summary_is_written_to_the_results_root() {
        let tmp = tempfile::tempdir().unwrap();
        let results = tmp.path().join("results");
        let s = scheduler(RunConfig {
            results_dir: results.clone(),
            ..RunConfig::default()
        });
        let features = vec![feature("f", vec![scenario("x", &["I pass"])])];

        let result = s.run(&features).await.unwrap();
        assert!(result.ok());
        let raw = std::fs::read_to_string(results.join("run.json")).unwrap();
        let parsed: RunResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.scenarios.passed, 1);
        assert_eq!(parsed.run_id, result.run_id);
    }
}
