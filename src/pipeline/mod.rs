//! Sequential step executor.
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s plus a display name. Running
//! it threads one [`Context`] through every step, front to back:
//!
//! ```text
//! initial ctx ──▶ step 1 ──▶ step 2 ──▶ … ──▶ step n ──▶ PipelineOutput
//!                   │          │                 │
//!                   └──────────┴── first error ──┴──▶ PipelineAbortError
//! ```
//!
//! Before a step runs, the keys it [`requires`](Step::requires) must be
//! present; after it succeeds, the keys it [`produces`](Step::produces) must
//! be present. The first failure of any kind aborts the run, so a successful
//! return means every step executed exactly once, in declared order.
//!
//! There is no retry, skipping or reordering here. Re-running a pipeline
//! repeats every side effect of the steps that already succeeded.

pub mod step;

pub use step::Step;

use crate::context::Context;
use crate::error::{MissingInputError, PipelineAbortError, StepError};
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Timing for one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 1-indexed position in the pipeline.
    pub index: usize,
    pub name: String,
    pub duration_ms: u64,
}

/// Timing for a whole successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub pipeline: String,
    pub steps: Vec<StepReport>,
    pub total_duration_ms: u64,
}

/// Result of a successful run: the final context plus timing.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub context: Context,
    pub stats: RunStats,
}

impl PipelineOutput {
    pub fn into_context(self) -> Context {
        self.context
    }
}

/// An ordered, immutable-once-built sequence of steps.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PipelineProgressCallback>"))
            .finish()
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            progress: None,
        }
    }

    /// Append a step. Steps run in the order they were added.
    pub fn add_step(self, step: impl Step + 'static) -> Self {
        self.add_shared_step(Arc::new(step))
    }

    /// Append a step instance that is shared with other pipelines.
    pub fn add_shared_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step against `initial`, stopping at the first failure.
    ///
    /// # Errors
    /// Returns [`PipelineAbortError`] naming the failing step, its cause, and
    /// the context as it stood when the step failed.
    pub async fn run(&self, initial: Context) -> Result<PipelineOutput, PipelineAbortError> {
        let run_start = Instant::now();
        let total = self.steps.len();
        let mut ctx = initial;
        let mut reports = Vec::with_capacity(total);

        info!("Starting pipeline '{}' ({} steps)", self.name, total);
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_start(&self.name, total);
        }

        for (i, step) in self.steps.iter().enumerate() {
            let index = i + 1;
            let name = step.name();
            if let Some(ref cb) = self.progress {
                cb.on_step_start(index, total, name);
            }
            debug!("[{}/{}] {}: starting", index, total, name);

            let step_start = Instant::now();
            let outcome = match check_required(step.as_ref(), &ctx) {
                Ok(()) => step.execute(&mut ctx).await,
                Err(e) => Err(StepError::MissingInput(e)),
            };
            let outcome = outcome.and_then(|()| check_produced(step.as_ref(), &ctx));
            let duration_ms = step_start.elapsed().as_millis() as u64;

            if let Err(source) = outcome {
                warn!("[{}/{}] {} failed after {}ms: {}", index, total, name, duration_ms, source);
                if let Some(ref cb) = self.progress {
                    cb.on_step_error(index, total, name, &source.to_string());
                }
                return Err(PipelineAbortError {
                    pipeline: self.name.clone(),
                    step_index: index,
                    step_name: name.to_string(),
                    total_steps: total,
                    source,
                    context: Box::new(ctx),
                });
            }

            info!("[{}/{}] {} finished in {}ms", index, total, name, duration_ms);
            if let Some(ref cb) = self.progress {
                cb.on_step_complete(index, total, name, duration_ms);
            }
            reports.push(StepReport {
                index,
                name: name.to_string(),
                duration_ms,
            });
        }

        let total_duration_ms = run_start.elapsed().as_millis() as u64;
        info!("Pipeline '{}' complete in {}ms", self.name, total_duration_ms);
        if let Some(ref cb) = self.progress {
            cb.on_pipeline_complete(&self.name, total, total_duration_ms);
        }

        Ok(PipelineOutput {
            context: ctx,
            stats: RunStats {
                pipeline: self.name.clone(),
                steps: reports,
                total_duration_ms,
            },
        })
    }
}

fn check_required(step: &dyn Step, ctx: &Context) -> Result<(), MissingInputError> {
    match step.requires().iter().find(|k| !ctx.contains(k)) {
        Some(key) => Err(MissingInputError::absent(step.name(), *key)),
        None => Ok(()),
    }
}

fn check_produced(step: &dyn Step, ctx: &Context) -> Result<(), StepError> {
    match step.produces().iter().find(|k| !ctx.contains(k)) {
        Some(key) => Err(StepError::MissingOutput {
            key: (*key).to_string(),
        }),
        None => Ok(()),
    }
}
