//! Step execution: substitution, matching, retries, substep expansion.
//!
//! One [`StepExecutor`] lives inside one scenario run. It owns no shared
//! state; everything mutable (the scope, the outcome sink) is threaded
//! through explicitly, which keeps the recursive substep expansion an
//! ordinary bounded call structure.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::driver::Driver;
use crate::errors::{EngineError, Result};
use crate::matcher::{RetryMode, StepContext, StepImpl, StepMatcher};
use crate::model::{SkipReason, Status, Step, StepOutcome};
use crate::retry::{sleep_or_cancel, CancelToken, RetryPolicy};
use crate::vars::{substitute, substitute_arg, VariableScope};

/// Hard bound on substep nesting. Anything deeper is a runaway step
/// implementation, not a legitimate scenario.
pub const MAX_SUBSTEP_DEPTH: usize = 10;

pub struct StepExecutor {
    matcher: Arc<dyn StepMatcher>,
    driver: Arc<dyn Driver>,
    default_retry: RetryPolicy,
    cancel: CancelToken,
    scenario_dir: Option<PathBuf>,
}

impl StepExecutor {
    pub fn new(
        matcher: Arc<dyn StepMatcher>,
        driver: Arc<dyn Driver>,
        default_retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            matcher,
            driver,
            default_retry,
            cancel,
            scenario_dir: None,
        }
    }

    /// Attach the scenario's results directory; failure screenshots land
    /// there. Without one (dry-run has none) screenshots are skipped.
    pub fn with_scenario_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scenario_dir = dir;
        self
    }

    /// Execute one step, appending its outcome (and any substep outcomes,
    /// one depth level down) to `sink`. Returns the step's final status.
    ///
    /// Boxed future because substep expansion re-enters this function.
    pub fn execute<'a>(
        &'a self,
        step: &'a Step,
        scope: &'a mut VariableScope,
        depth: usize,
        sink: &'a mut Vec<StepOutcome>,
    ) -> Pin<Box<dyn Future<Output = Status> + Send + 'a>> {
        Box::pin(async move {
            let ordinal = sink.len();
            let started = Instant::now();

            if depth > MAX_SUBSTEP_DEPTH {
                let mut outcome = StepOutcome::unrun(&step.text, Status::Failed, ordinal);
                outcome.depth = depth;
                outcome.error = Some(EngineError::DepthExceeded(MAX_SUBSTEP_DEPTH).to_string());
                sink.push(outcome);
                return Status::Failed;
            }

            // Substitution first; its failure carries the literal step text.
            let (resolved, arg) = match substitute(&step.text, scope)
                .and_then(|text| substitute_arg(&step.arg, scope).map(|arg| (text, arg)))
            {
                Ok(pair) => pair,
                Err(e) => {
                    sink.push(StepOutcome {
                        text: step.text.clone(),
                        status: Status::Failed,
                        depth,
                        ordinal,
                        duration: started.elapsed(),
                        error: Some(e.to_string()),
                        skip_reason: None,
                        screenshot: None,
                    });
                    return Status::Failed;
                }
            };

            // Matcher miss is the `undefined` outcome, not an error.
            let Some(matched) = self.matcher.find(&resolved) else {
                debug!(step = %resolved, depth, "no matching implementation");
                let mut outcome = StepOutcome::unrun(&resolved, Status::Undefined, ordinal);
                outcome.depth = depth;
                outcome.error = Some(
                    EngineError::NoMatchingStep {
                        text: resolved.clone(),
                    }
                    .to_string(),
                );
                sink.push(outcome);
                return Status::Undefined;
            };

            debug!(step = %resolved, depth, "executing");
            let implementation = Arc::clone(&matched.implementation);
            let mut ctx = StepContext::new(scope, &self.driver, matched.captures, arg);
            let run_result = match matched.retry {
                RetryMode::Never => implementation.run(&mut ctx).await,
                RetryMode::RunDefault => {
                    self.run_retried(implementation.as_ref(), &mut ctx, self.default_retry)
                        .await
                }
                RetryMode::Policy(policy) => {
                    self.run_retried(implementation.as_ref(), &mut ctx, policy)
                        .await
                }
            };
            let substeps = ctx.take_substeps();
            drop(ctx);

            match run_result {
                Ok(()) => {
                    // Reserve the parent's slot so it precedes its substeps
                    // in the trace, then patch it once they have run.
                    let mut parent = StepOutcome::unrun(&resolved, Status::Passed, ordinal);
                    parent.depth = depth;
                    sink.push(parent);

                    let mut status = Status::Passed;
                    let mut remaining = substeps.iter();
                    for sub in remaining.by_ref() {
                        match self.execute(sub, scope, depth + 1, sink).await {
                            Status::Passed => {}
                            // A skipped substep means the run is being torn
                            // down; the parent is skipped, not broken.
                            Status::Skipped => {
                                status = Status::Skipped;
                                break;
                            }
                            _ => {
                                status = Status::Failed;
                                break;
                            }
                        }
                    }
                    // Substeps after the halting one never run.
                    let reason = if matches!(status, Status::Skipped) {
                        SkipReason::RunAborted
                    } else {
                        SkipReason::PriorFailure
                    };
                    for unrun in remaining {
                        let mut outcome =
                            StepOutcome::unrun(&unrun.text, Status::Skipped, sink.len());
                        outcome.depth = depth + 1;
                        outcome.skip_reason = Some(reason);
                        sink.push(outcome);
                    }

                    sink[ordinal].status = status;
                    sink[ordinal].duration = started.elapsed();
                    match status {
                        Status::Failed => {
                            sink[ordinal].error = Some("substep failed".to_string());
                        }
                        Status::Skipped => {
                            sink[ordinal].skip_reason = Some(SkipReason::RunAborted);
                        }
                        _ => {}
                    }
                    status
                }
                Err(EngineError::SchedulerAbort) => {
                    let mut outcome = StepOutcome::unrun(&resolved, Status::Skipped, ordinal);
                    outcome.depth = depth;
                    outcome.duration = started.elapsed();
                    outcome.skip_reason = Some(SkipReason::RunAborted);
                    sink.push(outcome);
                    Status::Skipped
                }
                Err(e) => {
                    let screenshot = self.capture_failure(ordinal).await;
                    sink.push(StepOutcome {
                        text: resolved,
                        status: Status::Failed,
                        depth,
                        ordinal,
                        duration: started.elapsed(),
                        error: Some(e.to_string()),
                        skip_reason: None,
                        screenshot,
                    });
                    Status::Failed
                }
            }
        })
    }

    /// Retry loop specialised for step bodies, which re-borrow the scenario
    /// scope on every attempt. Only the final attempt's substep queue
    /// survives; earlier attempts' queues are discarded.
    async fn run_retried(
        &self,
        implementation: &dyn StepImpl,
        ctx: &mut StepContext<'_>,
        policy: RetryPolicy,
    ) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            ctx.clear_substeps();
            match implementation.run(ctx).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    if started.elapsed() >= policy.timeout {
                        return Err(EngineError::Timeout {
                            timeout: policy.timeout,
                            last: e.to_string(),
                        });
                    }
                    sleep_or_cancel(policy.poll_interval, &self.cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort failure screenshot; diagnostics must never turn a step
    /// failure into a run crash.
    async fn capture_failure(&self, ordinal: usize) -> Option<PathBuf> {
        let dir = self.scenario_dir.as_ref()?;
        match self.driver.screenshot().await {
            Ok(bytes) => {
                let path = dir.join(format!("step-{ordinal:03}-failure.png"));
                match std::fs::write(&path, bytes) {
                    Ok(()) => Some(path),
                    Err(e) => {
                        debug!(error = %e, "could not write failure screenshot");
                        None
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "could not capture failure screenshot");
                None
            }
        }
    }
}
