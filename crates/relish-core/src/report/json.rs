//! Machine-readable run summary, written to `<results>/run.json`.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::Result;
use crate::model::RunResult;

pub const RUN_SUMMARY_FILE: &str = "run.json";

/// Serialize the whole run, outcomes included, into the results root.
/// Written once, after aggregation, by the scheduler.
pub fn write_run_summary(results_root: &Path, result: &RunResult) -> Result<PathBuf> {
    let path = results_root.join(RUN_SUMMARY_FILE);
    let mut payload = serde_json::to_vec_pretty(result)?;
    payload.push(b'\n');
    std::fs::write(&path, payload)?;
    info!(path = %path.display(), "run summary written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::model::Tally;

    #[test]
    fn summary_roundtrips_through_disk() {
        let result = RunResult {
            run_id: "abc-123".into(),
            finished_at: Utc::now(),
            features: Tally {
                passed: 1,
                ..Tally::default()
            },
            scenarios: Tally {
                passed: 3,
                failed: 1,
                ..Tally::default()
            },
            steps: Tally {
                passed: 9,
                failed: 1,
                skipped: 2,
                ..Tally::default()
            },
            duration: Duration::from_millis(4500),
            workers: 2,
            dry_run: false,
            outcomes: vec![],
        };

        let tmp = tempfile::tempdir().expect("tempdir");
        let path = write_run_summary(tmp.path(), &result).expect("write");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("run.json"));

        let raw = std::fs::read_to_string(&path).expect("read");
        let parsed: RunResult = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed.run_id, "abc-123");
        assert_eq!(parsed.scenarios.total(), 4);
        assert_eq!(parsed.duration, Duration::from_millis(4500));
    }
}
