//! # deepread
//!
//! Turn PDFs into Markdown summaries by chaining external services through a
//! small, generic pipeline engine.
//!
//! ## Pipeline Overview
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s run against one shared
//! [`Context`]. Each step declares the keys it needs and the keys it writes;
//! the executor checks both, stops at the first failure, and reports which
//! step broke and why.
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload     publish the file (Gitee)          → remote_url
//!  ├─ 2. Parse      PDF → Markdown (MinerU, zip)      → markdown_content
//!  ├─ 3. Summarize  LLM summary + cleanup             → summary_text
//!  └─ 4. Save       atomic write to disk              → output_path
//! ```
//!
//! Other flows swap the front of the chain: `LocalParse` reads the PDF text
//! layer with pdfium instead of uploading, and `LoadMarkdown` starts from an
//! existing Markdown file. See [`Flow`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deepread::{process, DeepReadConfig, PipelineFactory, ProcessRequest, SummaryStyle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = PipelineFactory::new(DeepReadConfig::from_env()?);
//!     let request = ProcessRequest::new("paper.pdf").style(SummaryStyle::Academic);
//!
//!     let output = process(&factory, &request).await?;
//!     eprintln!("done in {} ms", output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Pipelines
//!
//! Any type implementing [`Step`] can be chained; the built-in steps live in
//! [`steps`] and their collaborators in [`services`].
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `deepread` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod pipeline;
pub mod postprocess;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod services;
pub mod steps;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigSummary, DeepReadConfig, DeepReadConfigBuilder};
pub use context::{keys, Context, ContextValue};
pub use error::{
    CollaboratorError, DeepReadError, InputProblem, MissingInputError, PipelineAbortError,
    StepError,
};
pub use factory::{Flow, PipelineFactory};
pub use pipeline::{Pipeline, PipelineOutput, RunStats, Step, StepReport};
pub use process::{
    initial_context, process, process_batch, select_flow, validate_input, ProcessRequest,
    StepMode,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use prompts::SummaryStyle;
