//! Data model: features, scenarios, steps, outcomes and tallies.
//!
//! Features, scenarios and steps are parsed once and read-only for the
//! duration of a run. Outcomes and tallies are append-only and accumulate
//! monotonically while the run executes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Ordered sequence of scenarios with a name and file-path identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
    pub scenarios: Vec<Scenario>,
}

/// Ordered sequence of step items, owned by exactly one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<ScenarioItem>,
}

impl Scenario {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Number of top-level steps, with repeat blocks expanded.
    pub fn step_count(&self) -> usize {
        self.steps
            .iter()
            .map(|item| match item {
                ScenarioItem::Repeat(r) => r.steps.len() * r.times as usize,
                ScenarioItem::Step(_) => 1,
            })
            .sum()
    }
}

/// A scenario entry: either a plain step or a "repeat N times" block.
///
/// Repeat is sugar handled by the scenario runner: each iteration runs the
/// enclosed block inside a fresh scope frame binding the iteration variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioItem {
    Repeat(RepeatBlock),
    Step(Step),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatBlock {
    pub times: u32,
    /// Name the iteration counter is bound to inside each iteration's frame.
    #[serde(default = "default_repeat_var")]
    pub var: String,
    pub steps: Vec<Step>,
}

fn default_repeat_var() -> String {
    "ITERATION".to_string()
}

/// One text line plus optional multiline/table argument. Resolved to an
/// implementation only at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    #[serde(default, skip_serializing_if = "StepArg::is_none")]
    pub arg: StepArg,
}

impl Step {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            arg: StepArg::None,
        }
    }

    pub fn with_table(text: impl Into<String>, table: Vec<Vec<String>>) -> Self {
        Self {
            text: text.into(),
            arg: StepArg::Table(table),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepArg {
    #[default]
    None,
    DocString(String),
    Table(Vec<Vec<String>>),
}

impl StepArg {
    pub fn is_none(&self) -> bool {
        matches!(self, StepArg::None)
    }
}

/// The closed set of outcome categories, shared by steps, scenarios and
/// features. The matcher-miss condition is the `Undefined` variant here,
/// not an exception type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Undefined,
    Untested,
}

/// Why a step or scenario was skipped. One `skipped` tally category, two
/// causes kept apart so the trace can render them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The scenario carried a skip tag (e.g. `disabled`).
    Tagged,
    /// A previous step failed or was undefined.
    PriorFailure,
    /// Stop-on-failure halted dispatch before this unit started.
    RunAborted,
}

/// The recorded result of one step execution.
///
/// `depth` is 0 for top-level steps and `n+1` for substeps issued by a step
/// at depth `n`. `ordinal` is the position in the scenario's step stream and
/// reconstructs display order in the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub text: String,
    pub status: Status,
    pub depth: usize,
    pub ordinal: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl StepOutcome {
    pub(crate) fn unrun(text: &str, status: Status, ordinal: usize) -> Self {
        Self {
            text: text.to_string(),
            status,
            depth: 0,
            ordinal,
            duration: Duration::ZERO,
            error: None,
            skip_reason: None,
            screenshot: None,
        }
    }
}

/// The recorded result of one scenario, carrying its original declaration
/// indices so the aggregator can rebuild report order from any arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// Position in the flattened declaration order across all features.
    pub seq: usize,
    pub feature_index: usize,
    pub feature_name: String,
    pub scenario_name: String,
    pub status: Status,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Scenario-level failure outside any step (e.g. results dir setup).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepOutcome>,
}

/// Exact per-category counts. `sum() == total` is the core correctness
/// property of the aggregator and is asserted when merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub undefined: usize,
    pub untested: usize,
}

impl Tally {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Undefined => self.undefined += 1,
            Status::Untested => self.untested += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.undefined + self.untested
    }
}

/// Aggregated counts for the whole run plus the ordered scenario outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub features: Tally,
    pub scenarios: Tally,
    pub steps: Tally,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub workers: usize,
    pub dry_run: bool,
    /// Sorted by `seq`, i.e. declaration order.
    pub outcomes: Vec<ScenarioOutcome>,
}

impl RunResult {
    /// Exit-status contract: success iff every dispatched scenario passed,
    /// was intentionally skipped, or was a dry-run classification.
    pub fn ok(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, Status::Passed | Status::Skipped | Status::Untested))
    }
}

/// Serialize durations as integer milliseconds; report consumers parse these.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
