//! Per-run results area on the filesystem.
//!
//! One subdirectory per scenario under the results root; the worker
//! executing a scenario is the only writer of its directory. Dry-run never
//! constructs a results area at all.

use std::path::{Path, PathBuf};

use crate::errors::{EngineError, Result};

#[derive(Debug)]
pub struct ResultsArea {
    root: PathBuf,
}

impl ResultsArea {
    /// Create the results root. Refuses a pre-existing root unless `reuse`
    /// is set, so stale artifacts from an earlier run cannot mix in.
    pub fn prepare(root: impl Into<PathBuf>, reuse: bool) -> Result<Self> {
        let root = root.into();
        if root.exists() && !reuse {
            return Err(EngineError::InvalidConfig(format!(
                "results directory {} already exists (pass --reuse-results to keep it)",
                root.display()
            )));
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one scenario, created on first use. The sequence index
    /// prefix keeps directories unique even for same-named scenarios.
    pub fn scenario_dir(&self, seq: usize, scenario_name: &str) -> Result<PathBuf> {
        let dir = self.root.join(format!("{seq:03}-{}", slug(scenario_name)));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Filesystem-safe scenario name: lowercase alphanumerics, runs of anything
/// else collapsed to a single dash.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "scenario".to_string()
    } else {
        out
    }
}
