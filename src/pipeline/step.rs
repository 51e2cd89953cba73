//! The step contract.

use crate::context::Context;
use crate::error::StepError;
use async_trait::async_trait;

/// One named unit of work in a [`crate::Pipeline`].
///
/// A step reads the keys it needs from the context, does its work (possibly
/// calling a collaborator), and writes its results back. Anything a step
/// needs between runs belongs in its constructor arguments; anything scoped
/// to a single run belongs in the context. That keeps one step instance safe
/// to share between concurrent runs over different contexts.
///
/// Side effects (uploads, file writes) are not rolled back when a later step
/// fails, and re-running a pipeline repeats them.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable name used in logs, progress events and errors.
    fn name(&self) -> &str;

    /// Keys that must be present before [`Step::execute`] is called.
    ///
    /// The executor checks presence; the step itself still validates the
    /// shape of each value.
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    /// Keys guaranteed to be present after a successful execution.
    fn produces(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run the step against `ctx`.
    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError>;
}
