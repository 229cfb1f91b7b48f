//! Human-readable run report.
//!
//! Formatting is split from printing so tests can assert on exact lines.
//! Output goes to stderr; stdout stays clean for whatever the embedding
//! process pipes.

use std::time::Duration;

use crate::model::{RunResult, ScenarioOutcome, Status, Tally};

pub fn status_word(status: Status) -> &'static str {
    match status {
        Status::Passed => "passed",
        Status::Failed => "failed",
        Status::Skipped => "skipped",
        Status::Undefined => "undefined",
        Status::Untested => "untested",
    }
}

pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 60.0 {
        let minutes = (secs / 60.0).floor() as u64;
        format!("{minutes}m{:.3}s", secs - (minutes * 60) as f64)
    } else {
        format!("{secs:.3}s")
    }
}

/// The trace block for one scenario: a header line, then one line per
/// recorded step with substeps indented one level per depth under a "↳"
/// marker, then error detail lines where present.
pub fn scenario_lines(outcome: &ScenarioOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "  Scenario: {}  [{} in {}]",
        outcome.scenario_name,
        status_word(outcome.status),
        fmt_duration(outcome.duration)
    ));
    if let Some(error) = &outcome.error {
        lines.push(format!("            {error}"));
    }
    for step in &outcome.steps {
        let indent = "  ".repeat(step.depth);
        let marker = if step.depth > 0 { "↳ " } else { "" };
        let mut line = format!(
            "    {indent}{marker}{:<9} {}",
            status_word(step.status),
            step.text
        );
        if !step.duration.is_zero() {
            line.push_str(&format!("  ({})", fmt_duration(step.duration)));
        }
        lines.push(line);
        if let Some(error) = &step.error {
            lines.push(format!("    {indent}{marker}          {error}"));
        }
        if let Some(shot) = &step.screenshot {
            lines.push(format!(
                "    {indent}{marker}          screenshot: {}",
                shot.display()
            ));
        }
    }
    lines
}

fn tally_line(tally: &Tally, singular: &str, plural: &str, always_undefined: bool) -> String {
    let noun = if tally.passed == 1 { singular } else { plural };
    let mut line = format!(
        "{} {noun} passed, {} failed, {} skipped",
        tally.passed, tally.failed, tally.skipped
    );
    if always_undefined || tally.undefined > 0 {
        line.push_str(&format!(", {} undefined", tally.undefined));
    }
    if tally.untested > 0 {
        line.push_str(&format!(", {} untested", tally.untested));
    }
    line
}

pub fn summary_lines(result: &RunResult) -> Vec<String> {
    let mut lines = vec![
        tally_line(&result.features, "feature", "features", false),
        tally_line(&result.scenarios, "scenario", "scenarios", false),
        tally_line(&result.steps, "step", "steps", true),
    ];
    if result.dry_run {
        lines.push("dry run: nothing was executed".to_string());
    }
    lines.push(format!("finished in {}", fmt_duration(result.duration)));
    lines
}

/// Print the full trace and summary to stderr.
pub fn print_report(result: &RunResult) {
    let mut last_feature = None;
    for outcome in &result.outcomes {
        if last_feature != Some(outcome.feature_index) {
            eprintln!("Feature: {}", outcome.feature_name);
            last_feature = Some(outcome.feature_index);
        }
        for line in scenario_lines(outcome) {
            eprintln!("{line}");
        }
    }
    eprintln!();
    for line in summary_lines(result) {
        eprintln!("{line}");
    }
}
