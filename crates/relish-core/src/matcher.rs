//! Step-matching boundary and the implementation-side API.
//!
//! The Gherkin-side matcher is an external capability: given resolved step
//! text it either returns the matching implementation with captured
//! arguments or reports no match. [`RegexRegistry`] is the bundled
//! implementation of that capability; embedders may supply their own.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::driver::Driver;
use crate::errors::Result;
use crate::model::{Step, StepArg};
use crate::retry::RetryPolicy;
use crate::vars::VariableScope;

/// Everything a step implementation gets to work with: the scenario's
/// variable scope, the worker's driver session, the captures from the
/// matcher, and the (already substituted) step argument.
pub struct StepContext<'a> {
    pub scope: &'a mut VariableScope,
    pub driver: &'a Arc<dyn Driver>,
    pub captures: Vec<String>,
    pub arg: StepArg,
    substeps: Vec<Step>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        scope: &'a mut VariableScope,
        driver: &'a Arc<dyn Driver>,
        captures: Vec<String>,
        arg: StepArg,
    ) -> Self {
        Self {
            scope,
            driver,
            captures,
            arg,
            substeps: Vec::new(),
        }
    }

    /// Capture group `i` (1-based, as in the pattern), or empty.
    pub fn capture(&self, i: usize) -> &str {
        self.captures
            .get(i.saturating_sub(1))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Queue a nested step. Substeps run after this implementation returns
    /// successfully, each independently matched, retried and reported one
    /// display level deeper than the issuing step.
    pub fn invoke(&mut self, step: Step) {
        self.substeps.push(step);
    }

    /// Queue a nested step from bare text.
    pub fn invoke_text(&mut self, text: impl Into<String>) {
        self.substeps.push(Step::new(text));
    }

    pub(crate) fn take_substeps(&mut self) -> Vec<Step> {
        std::mem::take(&mut self.substeps)
    }

    pub(crate) fn clear_substeps(&mut self) {
        self.substeps.clear();
    }
}

/// A step's executable body.
#[async_trait]
pub trait StepImpl: Send + Sync {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()>;
}

/// How a matched step interacts with the retry engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Execute exactly once.
    Never,
    /// Retry with the run-level default policy.
    RunDefault,
    /// Retry with a policy the implementation declared itself.
    Policy(RetryPolicy),
}

/// A successful match: the implementation, its captured arguments, and its
/// declared retry behavior.
pub struct MatchedStep {
    pub implementation: Arc<dyn StepImpl>,
    pub captures: Vec<String>,
    pub retry: RetryMode,
}

/// External matcher capability: `find` returns `None` for a matcher miss,
/// which the executor records as an `undefined` outcome.
pub trait StepMatcher: Send + Sync {
    fn find(&self, text: &str) -> Option<MatchedStep>;
}

struct Entry {
    pattern: Regex,
    /// The pattern as registered, before anchoring; listing surfaces.
    pattern_text: String,
    implementation: Arc<dyn StepImpl>,
    retry: RetryMode,
}

/// Pattern-ordered step registry. The first fully-matching pattern wins.
#[derive(Default)]
pub struct RegexRegistry {
    entries: Vec<Entry>,
}

impl RegexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a non-retryable step. Patterns are anchored to the whole
    /// step text.
    pub fn register(
        &mut self,
        pattern: &str,
        implementation: Arc<dyn StepImpl>,
    ) -> std::result::Result<(), regex::Error> {
        self.register_mode(pattern, RetryMode::Never, implementation)
    }

    /// Register a step that polls until its condition holds or the
    /// run-level timeout elapses.
    pub fn register_retryable(
        &mut self,
        pattern: &str,
        implementation: Arc<dyn StepImpl>,
    ) -> std::result::Result<(), regex::Error> {
        self.register_mode(pattern, RetryMode::RunDefault, implementation)
    }

    pub fn register_mode(
        &mut self,
        pattern: &str,
        retry: RetryMode,
        implementation: Arc<dyn StepImpl>,
    ) -> std::result::Result<(), regex::Error> {
        let anchored = format!("^{pattern}$");
        self.entries.push(Entry {
            pattern: Regex::new(&anchored)?,
            pattern_text: pattern.to_string(),
            implementation,
            retry,
        });
        Ok(())
    }

    /// Registered patterns in registration (i.e. match-priority) order,
    /// paired with their retry mode. The step-inventory surface.
    pub fn patterns(&self) -> impl Iterator<Item = (&str, RetryMode)> + '_ {
        self.entries
            .iter()
            .map(|e| (e.pattern_text.as_str(), e.retry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StepMatcher for RegexRegistry {
    fn find(&self, text: &str) -> Option<MatchedStep> {
        for entry in &self.entries {
            if let Some(caps) = entry.pattern.captures(text) {
                let captures = caps
                    .iter()
                    .skip(1)
                    .map(|c| c.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                return Some(MatchedStep {
                    implementation: Arc::clone(&entry.implementation),
                    captures,
                    retry: entry.retry,
                });
            }
        }
        None
    }
}
