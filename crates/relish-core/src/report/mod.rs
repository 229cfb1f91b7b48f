//! Deterministic aggregation of worker output.
//!
//! Workers hand back outcomes in completion order; everything here is a
//! pure function of that set, sorted back into declaration order, so the
//! report for a given input is identical whether the run used one worker
//! or twenty.

pub mod console;
pub mod json;

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{RunResult, ScenarioOutcome, Status, Tally};

/// Fold completion-ordered outcomes into a [`RunResult`].
///
/// Step tallies count top-level steps only; substeps show up in the trace
/// but never inflate the counts a scenario author would predict from the
/// scenario text.
pub fn aggregate(
    mut outcomes: Vec<ScenarioOutcome>,
    feature_count: usize,
    duration: Duration,
    workers: usize,
    dry_run: bool,
) -> RunResult {
    outcomes.sort_by_key(|o| o.seq);

    let mut scenarios = Tally::default();
    let mut steps = Tally::default();
    for outcome in &outcomes {
        scenarios.record(outcome.status);
        for step in outcome.steps.iter().filter(|s| s.depth == 0) {
            steps.record(step.status);
        }
    }

    let mut features = Tally::default();
    for feature_index in 0..feature_count {
        let status = feature_status(
            outcomes
                .iter()
                .filter(|o| o.feature_index == feature_index)
                .map(|o| o.status),
        );
        features.record(status);
    }

    debug_assert_eq!(features.total(), feature_count);
    debug_assert_eq!(scenarios.total(), outcomes.len());

    RunResult {
        run_id: Uuid::new_v4().to_string(),
        finished_at: Utc::now(),
        features,
        scenarios,
        steps,
        duration,
        workers,
        dry_run,
        outcomes,
    }
}

/// A feature's category, derived from its scenarios: failure dominates,
/// then undefined; a feature passes if anything in it passed and nothing
/// went wrong; a feature nothing ran in is untested.
pub fn feature_status(scenarios: impl Iterator<Item = Status>) -> Status {
    let mut any = false;
    let mut any_passed = false;
    let mut any_undefined = false;
    let mut all_untested = true;
    for status in scenarios {
        any = true;
        match status {
            Status::Failed => return Status::Failed,
            Status::Undefined => any_undefined = true,
            Status::Passed => any_passed = true,
            Status::Skipped | Status::Untested => {}
        }
        if status != Status::Untested {
            all_untested = false;
        }
    }
    if !any || all_untested {
        Status::Untested
    } else if any_undefined {
        Status::Undefined
    } else if any_passed {
        Status::Passed
    } else {
        Status::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SkipReason, StepOutcome};

    fn outcome(seq: usize, feature_index: usize, status: Status) -> ScenarioOutcome {
        let mut step = StepOutcome::unrun("a step", status, 0);
        let substep = {
            let mut s = StepOutcome::unrun("a substep", Status::Passed, 1);
            s.depth = 1;
            s
        };
        if status == Status::Skipped {
            step.skip_reason = Some(SkipReason::PriorFailure);
        }
        ScenarioOutcome {
            seq,
            feature_index,
            feature_name: format!("feature {feature_index}"),
            scenario_name: format!("scenario {seq}"),
            status,
            duration: Duration::from_millis(10),
            skip_reason: None,
            error: None,
            steps: vec![step, substep],
        }
    }

    #[test]
    fn outcomes_are_resorted_into_declaration_order() {
        let shuffled = vec![
            outcome(2, 0, Status::Passed),
            outcome(0, 0, Status::Passed),
            outcome(1, 0, Status::Passed),
        ];
        let result = aggregate(shuffled, 1, Duration::ZERO, 4, false);
        let seqs: Vec<usize> = result.outcomes.iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn tallies_close_over_every_category() {
        let result = aggregate(
            vec![
                outcome(0, 0, Status::Passed),
                outcome(1, 0, Status::Failed),
                outcome(2, 1, Status::Skipped),
                outcome(3, 1, Status::Undefined),
                outcome(4, 2, Status::Untested),
            ],
            3,
            Duration::ZERO,
            1,
            false,
        );
        assert_eq!(result.scenarios.total(), 5);
        assert_eq!(result.scenarios.passed, 1);
        assert_eq!(result.scenarios.failed, 1);
        assert_eq!(result.scenarios.skipped, 1);
        assert_eq!(result.scenarios.undefined, 1);
        assert_eq!(result.scenarios.untested, 1);
        assert_eq!(result.features.total(), 3);
        assert_eq!(result.features.failed, 1);
        assert_eq!(result.features.undefined, 1);
        assert_eq!(result.features.untested, 1);
    }

    #[test]
    fn substeps_stay_out_of_the_step_tally() {
        let result = aggregate(vec![outcome(0, 0, Status::Passed)], 1, Duration::ZERO, 1, false);
        // Each outcome carries one top-level step plus one substep.
        assert_eq!(result.steps.total(), 1);
    }

    #[test]
    fn feature_category_follows_dominance_order() {
        use Status::*;
        let s = |v: Vec<Status>| feature_status(v.into_iter());
        assert_eq!(s(vec![Passed, Failed, Passed]), Failed);
        assert_eq!(s(vec![Passed, Undefined]), Undefined);
        assert_eq!(s(vec![Passed, Skipped]), Passed);
        assert_eq!(s(vec![Skipped, Skipped]), Skipped);
        assert_eq!(s(vec![Untested, Untested]), Untested);
        assert_eq!(s(vec![]), Untested);
    }
}
