//! Progress-callback trait for pipeline step events.
//!
//! Attach an [`Arc<dyn PipelineProgressCallback>`] with
//! [`crate::Pipeline::with_progress`] (or through
//! [`crate::PipelineFactory::progress_callback`]) to receive events as a run
//! moves through its steps.
//!
//! Events are advisory: the executor ignores whatever a callback does, and a
//! callback cannot change which step runs next.
//!
//! # Example
//!
//! ```rust
//! use deepread::{PipelineProgressCallback, Pipeline};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_step_complete(&self, index: usize, total: usize, step: &str, elapsed_ms: u64) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {step} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let pipeline = Pipeline::new("demo").with_progress(Arc::new(CountingCallback {
//!     finished: AtomicUsize::new(0),
//! }));
//! assert!(pipeline.is_empty());
//! ```

use std::sync::Arc;

/// Called by the executor as a run progresses.
///
/// Implementations must be `Send + Sync`: the same pipeline may be run for
/// several documents at once, in which case events from different runs
/// interleave. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first step.
    fn on_pipeline_start(&self, pipeline: &str, total_steps: usize) {
        let _ = (pipeline, total_steps);
    }

    /// Called just before a step executes.
    ///
    /// # Arguments
    /// * `index`: 1-indexed step position
    /// * `total`: number of steps in the pipeline
    /// * `step` : step name
    fn on_step_start(&self, index: usize, total: usize, step: &str) {
        let _ = (index, total, step);
    }

    /// Called when a step finishes successfully.
    fn on_step_complete(&self, index: usize, total: usize, step: &str, elapsed_ms: u64) {
        let _ = (index, total, step, elapsed_ms);
    }

    /// Called when a step fails. No further step events follow for the run.
    fn on_step_error(&self, index: usize, total: usize, step: &str, error: &str) {
        let _ = (index, total, step, error);
    }

    /// Called once after every step succeeded.
    fn on_pipeline_complete(&self, pipeline: &str, total_steps: usize, elapsed_ms: u64) {
        let _ = (pipeline, total_steps, elapsed_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored on a [`crate::Pipeline`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
