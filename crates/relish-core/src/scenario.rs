//! Scenario sequencing: `NotStarted → Running → {Passed, Failed, Skipped}`.
//!
//! A scenario never starts if it carries a skip tag (straight to all-steps
//! skipped) or if the run is a dry run (straight to a reporting-only pass
//! that classifies every step untested). While running, the first failed or
//! undefined step halts execution and marks the remaining steps skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::driver::Driver;
use crate::executor::StepExecutor;
use crate::matcher::StepMatcher;
use crate::model::{
    Scenario, ScenarioItem, ScenarioOutcome, SkipReason, Status, StepOutcome,
};
use crate::results::ResultsArea;
use crate::retry::{CancelToken, RetryPolicy};
use crate::vars::VariableScope;

/// One dispatched scenario, tagged with its original declaration indices so
/// the aggregator can rebuild report order regardless of completion order.
#[derive(Debug, Clone)]
pub struct ScenarioUnit {
    pub seq: usize,
    pub feature_index: usize,
    pub feature_name: String,
    pub scenario: Scenario,
}

/// Executes one scenario at a time inside one worker. Holds no state that
/// outlives a call to [`run`](Self::run) except its collaborators.
pub struct ScenarioRunner {
    pub matcher: Arc<dyn StepMatcher>,
    /// The worker's isolated driver session; `None` only in dry-run, which
    /// never executes anything.
    pub driver: Option<Arc<dyn Driver>>,
    pub skip_tags: HashSet<String>,
    pub dry_run: bool,
    pub default_retry: RetryPolicy,
    pub cancel: CancelToken,
}

/// Why a running scenario stopped early.
enum Halt {
    Failure(Status),
    Aborted,
}

impl ScenarioRunner {
    pub async fn run(&self, unit: &ScenarioUnit, results: Option<&ResultsArea>) -> ScenarioOutcome {
        let started = Instant::now();
        info!(scenario = %unit.scenario.name, feature = %unit.feature_name, "scenario started");

        if let Some(tag) = unit
            .scenario
            .tags
            .iter()
            .find(|t| self.skip_tags.contains(*t))
        {
            info!(scenario = %unit.scenario.name, tag = %tag, "scenario skipped by tag");
            return self.unrun_outcome(unit, Status::Skipped, Some(SkipReason::Tagged), started);
        }

        if self.dry_run {
            return self.unrun_outcome(unit, Status::Untested, None, started);
        }

        let outcome = self.run_steps(unit, results, started).await;
        info!(
            scenario = %unit.scenario.name,
            status = ?outcome.status,
            steps = outcome.steps.len(),
            "scenario finished"
        );
        outcome
    }

    async fn run_steps(
        &self,
        unit: &ScenarioUnit,
        results: Option<&ResultsArea>,
        started: Instant,
    ) -> ScenarioOutcome {
        let Some(driver) = self.driver.as_ref() else {
            return self.setup_failure(unit, "worker has no driver session", started);
        };

        let scenario_dir = match results {
            Some(area) => match area.scenario_dir(unit.seq, &unit.scenario.name) {
                Ok(dir) => Some(dir),
                Err(e) => return self.setup_failure(unit, &e.to_string(), started),
            },
            None => None,
        };

        // Outermost scope frame, created at scenario start.
        let mut scope = VariableScope::new();
        if let Some(dir) = &scenario_dir {
            scope.define("SCENARIO_RESULTS_DIR", dir.display().to_string());
        }

        let executor = StepExecutor::new(
            Arc::clone(&self.matcher),
            Arc::clone(driver),
            self.default_retry,
            self.cancel.clone(),
        )
        .with_scenario_dir(scenario_dir);

        let mut outcomes: Vec<StepOutcome> = Vec::new();
        let mut halted: Option<Halt> = None;
        let items = &unit.scenario.steps;
        let mut next_item = 0;

        while next_item < items.len() && halted.is_none() {
            // Cancellation is observed at step boundaries, never mid-action.
            if self.cancel.is_cancelled() {
                halted = Some(Halt::Aborted);
                break;
            }
            match &items[next_item] {
                ScenarioItem::Step(step) => {
                    let status = executor.execute(step, &mut scope, 0, &mut outcomes).await;
                    halted = Self::halt_for(status);
                }
                ScenarioItem::Repeat(block) => {
                    // One fresh frame per iteration; the binding never leaks.
                    for i in 1..=block.times {
                        if halted.is_none() {
                            scope.push();
                            scope.define(block.var.clone(), i.to_string());
                            let mut steps = block.steps.iter();
                            for step in steps.by_ref() {
                                let status =
                                    executor.execute(step, &mut scope, 0, &mut outcomes).await;
                                halted = Self::halt_for(status);
                                if halted.is_some() {
                                    break;
                                }
                            }
                            // Rest of a halted iteration stays in the tally
                            // as skipped; no partial credit for the block.
                            let reason = halt_skip_reason(&halted);
                            for unrun in steps {
                                push_unrun_step(
                                    &mut outcomes,
                                    &unrun.text,
                                    Status::Skipped,
                                    Some(reason),
                                );
                            }
                            scope.pop();
                        } else {
                            let reason = halt_skip_reason(&halted);
                            for unrun in &block.steps {
                                push_unrun_step(
                                    &mut outcomes,
                                    &unrun.text,
                                    Status::Skipped,
                                    Some(reason),
                                );
                            }
                        }
                    }
                }
            }
            next_item += 1;
        }

        // Remaining items never ran; close the tally with skipped entries.
        let reason = halt_skip_reason(&halted);
        for item in &items[next_item..] {
            push_unrun_item(&mut outcomes, item, Status::Skipped, Some(reason));
        }

        let (status, skip_reason) = match halted {
            None => (Status::Passed, None),
            Some(Halt::Failure(s)) => (s, None),
            Some(Halt::Aborted) => (Status::Skipped, Some(SkipReason::RunAborted)),
        };

        ScenarioOutcome {
            seq: unit.seq,
            feature_index: unit.feature_index,
            feature_name: unit.feature_name.clone(),
            scenario_name: unit.scenario.name.clone(),
            status,
            duration: started.elapsed(),
            skip_reason,
            error: None,
            steps: outcomes,
        }
    }

    fn halt_for(status: Status) -> Option<Halt> {
        match status {
            Status::Passed => None,
            // Only the executor's scheduler-abort path yields Skipped here.
            Status::Skipped => Some(Halt::Aborted),
            Status::Failed => Some(Halt::Failure(Status::Failed)),
            Status::Undefined => Some(Halt::Failure(Status::Undefined)),
            Status::Untested => None,
        }
    }

    /// Classification-only outcome for scenarios that never start: tag
    /// skips and dry runs. Touches neither the retry engine nor the driver
    /// and creates no results directory.
    fn unrun_outcome(
        &self,
        unit: &ScenarioUnit,
        status: Status,
        skip_reason: Option<SkipReason>,
        started: Instant,
    ) -> ScenarioOutcome {
        let mut steps = Vec::new();
        for item in &unit.scenario.steps {
            push_unrun_item(&mut steps, item, status, skip_reason);
        }
        ScenarioOutcome {
            seq: unit.seq,
            feature_index: unit.feature_index,
            feature_name: unit.feature_name.clone(),
            scenario_name: unit.scenario.name.clone(),
            status,
            duration: started.elapsed(),
            skip_reason,
            error: None,
            steps,
        }
    }

    fn setup_failure(
        &self,
        unit: &ScenarioUnit,
        error: &str,
        started: Instant,
    ) -> ScenarioOutcome {
        let mut outcome = self.unrun_outcome(
            unit,
            Status::Skipped,
            Some(SkipReason::PriorFailure),
            started,
        );
        outcome.status = Status::Failed;
        outcome.skip_reason = None;
        outcome.error = Some(error.to_string());
        outcome
    }
}

/// Outcome for a unit stop-on-failure left undispatched: the scenario and
/// all of its declared steps are skipped with the run-aborted cause.
pub(crate) fn aborted_outcome(unit: &ScenarioUnit) -> ScenarioOutcome {
    let mut steps = Vec::new();
    for item in &unit.scenario.steps {
        push_unrun_item(
            &mut steps,
            item,
            Status::Skipped,
            Some(SkipReason::RunAborted),
        );
    }
    ScenarioOutcome {
        seq: unit.seq,
        feature_index: unit.feature_index,
        feature_name: unit.feature_name.clone(),
        scenario_name: unit.scenario.name.clone(),
        status: Status::Skipped,
        duration: std::time::Duration::ZERO,
        skip_reason: Some(SkipReason::RunAborted),
        error: None,
        steps,
    }
}

fn halt_skip_reason(halted: &Option<Halt>) -> SkipReason {
    match halted {
        Some(Halt::Aborted) => SkipReason::RunAborted,
        _ => SkipReason::PriorFailure,
    }
}

fn push_unrun_step(
    sink: &mut Vec<StepOutcome>,
    text: &str,
    status: Status,
    skip_reason: Option<SkipReason>,
) {
    let mut o = StepOutcome::unrun(text, status, sink.len());
    o.skip_reason = skip_reason;
    sink.push(o);
}

/// Append classification outcomes for an item that will not run, expanding
/// repeat blocks so tallies stay closed over every declared step execution.
fn push_unrun_item(
    sink: &mut Vec<StepOutcome>,
    item: &ScenarioItem,
    status: Status,
    skip_reason: Option<SkipReason>,
) {
    match item {
        ScenarioItem::Step(step) => push_unrun_step(sink, &step.text, status, skip_reason),
        ScenarioItem::Repeat(block) => {
            for _ in 0..block.times {
                for step in &block.steps {
                    push_unrun_step(sink, &step.text, status, skip_reason);
                }
            }
        }
    }
}
