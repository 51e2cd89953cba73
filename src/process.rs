//! Document-level entry points.
//!
//! These wrap the factory and the executor for the common case of "one file
//! in, one result out": pick the flow from the input type, check the file,
//! seed the context and run. [`process_batch`] does the same for many files
//! at once, each with its own fresh context.

use crate::context::{keys, Context};
use crate::error::DeepReadError;
use crate::factory::{Flow, PipelineFactory};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::prompts::SummaryStyle;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Run only part of the processing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    /// PDF → Markdown, no summary.
    Parse,
    /// Markdown → summary.
    Summarize,
}

/// One document to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    /// A `.pdf` or `.md` file.
    pub input: PathBuf,
    pub style: Option<SummaryStyle>,
    /// Replaces the style prompt when set.
    pub custom_prompt: Option<String>,
    /// Where the summary goes. Default: chosen by the Save step.
    pub output_path: Option<PathBuf>,
    pub step: Option<StepMode>,
    /// Extract PDF text locally instead of uploading to the remote parser.
    pub local: bool,
}

impl ProcessRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn style(mut self, style: SummaryStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn step(mut self, step: StepMode) -> Self {
        self.step = Some(step);
        self
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Check that `path` is an existing file with extension `expected`
/// (case-insensitive, without the dot).
pub fn validate_input(path: &Path, expected: &str) -> Result<(), DeepReadError> {
    let invalid = |reason: String| DeepReadError::InvalidInput {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(invalid("file does not exist".to_string()));
    }
    if !path.is_file() {
        return Err(invalid("not a regular file".to_string()));
    }
    if extension_of(path).as_deref() != Some(expected) {
        return Err(invalid(format!("expected a .{expected} file")));
    }
    Ok(())
}

/// Pick the flow for a request from its input type and options.
pub fn select_flow(request: &ProcessRequest) -> Result<Flow, DeepReadError> {
    let invalid = |reason: &str| DeepReadError::InvalidInput {
        path: request.input.clone(),
        reason: reason.to_string(),
    };

    match (extension_of(&request.input).as_deref(), request.step) {
        (Some("pdf"), None) if request.local => Ok(Flow::Local),
        (Some("pdf"), None) => Ok(Flow::Full),
        (Some("pdf"), Some(StepMode::Parse)) if request.local => Ok(Flow::LocalParseOnly),
        (Some("pdf"), Some(StepMode::Parse)) => Ok(Flow::ParseOnly),
        (Some("pdf"), Some(StepMode::Summarize)) => {
            Err(invalid("summarize-only mode needs a Markdown file"))
        }
        (Some("md"), None | Some(StepMode::Summarize)) => Ok(Flow::SummaryOnly),
        (Some("md"), Some(StepMode::Parse)) => Err(invalid("parse-only mode needs a PDF file")),
        _ => Err(DeepReadError::UnsupportedInput {
            path: request.input.clone(),
        }),
    }
}

/// Seed the context for a request run through `flow`.
pub fn initial_context(request: &ProcessRequest, flow: Flow) -> Context {
    let input_key = match flow {
        Flow::SummaryOnly => keys::MARKDOWN_PATH,
        _ => keys::PDF_PATH,
    };
    let mut ctx = Context::new().with(input_key, request.input.clone());

    if let Some(style) = request.style {
        ctx.insert(keys::STYLE, style.as_str());
    }
    if let Some(prompt) = &request.custom_prompt {
        ctx.insert(keys::CUSTOM_PROMPT, prompt.as_str());
    }
    if let Some(path) = &request.output_path {
        ctx.insert(keys::OUTPUT_PATH, path.clone());
    }
    ctx
}

fn input_extension(flow: Flow) -> &'static str {
    match flow {
        Flow::SummaryOnly => "md",
        _ => "pdf",
    }
}

/// Process one document.
///
/// # Errors
/// `UnsupportedInput`/`InvalidInput` before anything runs, `InvalidConfig`
/// when the flow's collaborators cannot be built, and `Aborted` when a step
/// fails.
pub async fn process(
    factory: &PipelineFactory,
    request: &ProcessRequest,
) -> Result<PipelineOutput, DeepReadError> {
    let flow = select_flow(request)?;
    validate_input(&request.input, input_extension(flow))?;
    let pipeline = factory.for_flow(flow)?;

    info!("Processing {} ({} flow)", request.input.display(), flow);
    run_prepared(&pipeline, request, flow).await
}

async fn run_prepared(
    pipeline: &Pipeline,
    request: &ProcessRequest,
    flow: Flow,
) -> Result<PipelineOutput, DeepReadError> {
    let output = pipeline.run(initial_context(request, flow)).await?;
    Ok(output)
}

/// Process many documents, at most `concurrency` at a time.
///
/// Each document gets a fresh context; one pipeline per flow is built and
/// shared by every document using that flow. Results come back in input
/// order, one per request, and a failure never stops the others.
pub async fn process_batch(
    factory: &PipelineFactory,
    requests: &[ProcessRequest],
    concurrency: usize,
) -> Vec<Result<PipelineOutput, DeepReadError>> {
    let mut pipelines: HashMap<Flow, Result<Arc<Pipeline>, DeepReadError>> = HashMap::new();

    let prepared: Vec<Result<(Arc<Pipeline>, Flow), DeepReadError>> = requests
        .iter()
        .map(|request| {
            let flow = select_flow(request)?;
            validate_input(&request.input, input_extension(flow))?;
            let built = pipelines
                .entry(flow)
                .or_insert_with(|| factory.for_flow(flow).map(Arc::new));
            match built {
                Ok(pipeline) => Ok((Arc::clone(pipeline), flow)),
                Err(e) => Err(rebuild_error(e)),
            }
        })
        .collect();

    debug!(
        "Batch of {} documents, {} pipelines, concurrency {}",
        requests.len(),
        pipelines.len(),
        concurrency
    );

    stream::iter(requests.iter().zip(prepared))
        .map(|(request, prepared)| async move {
            let (pipeline, flow) = prepared?;
            run_prepared(&pipeline, request, flow).await
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Factory errors are shared by every request of the same flow.
fn rebuild_error(e: &DeepReadError) -> DeepReadError {
    match e {
        DeepReadError::InvalidConfig(msg) => DeepReadError::InvalidConfig(msg.clone()),
        other => DeepReadError::Internal(other.to_string()),
    }
}
