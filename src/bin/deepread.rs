//! CLI binary for deepread.
//!
//! A thin shim over the library crate: maps flags onto `DeepReadConfig` and
//! `ProcessRequest`s, renders step progress and prints where results went.

use anyhow::{Context, Result};
use clap::Parser;
use deepread::{
    keys, process, process_batch, ContextValue, DeepReadConfig, DeepReadError, PipelineFactory,
    PipelineOutput, PipelineProgressCallback, ProcessRequest, ProgressCallback, StepMode,
    SummaryStyle,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting finished steps across every
/// document in the run, plus a log line per step.
///
/// With several documents in flight, events from different runs interleave;
/// the bar length grows as each run announces its step count.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Step start times, keyed by step name and position.
    start_times: Mutex<HashMap<(String, usize), Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} steps  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_ms(&self, step: &str, index: usize) -> u128 {
        self.start_times
            .lock()
            .map(|mut times| times.remove(&(step.to_string(), index)))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, pipeline: &str, total_steps: usize) {
        self.bar.inc_length(total_steps as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting {pipeline} pipeline ({total_steps} steps)…"))
        ));
    }

    fn on_step_start(&self, index: usize, _total: usize, step: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert((step.to_string(), index), Instant::now());
        }
        self.bar.set_message(step.to_string());
    }

    fn on_step_complete(&self, index: usize, total: usize, step: &str, elapsed_ms: u64) {
        self.elapsed_ms(step, index);
        self.bar.println(format!(
            "  {} Step {}/{}  {:<12}  {}",
            green("✓"),
            index,
            total,
            step,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_step_error(&self, index: usize, total: usize, step: &str, error: &str) {
        let elapsed_ms = self.elapsed_ms(step, index);

        // Keep log lines on one terminal row.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Step {}/{}  {:<12}  {}  {}",
            red("✗"),
            index,
            total,
            step,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        // Count the skipped remainder so the bar still reaches the end.
        self.bar.inc((total + 1 - index) as u64);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload, parse remotely, summarise (needs Gitee + MinerU credentials)
  deepread paper.pdf

  # Extract text locally with pdfium instead of uploading
  deepread --local paper.pdf -o paper_summary.md

  # Pick a summary style
  deepread -s academic paper.pdf

  # Custom instructions replace the style prompt
  deepread -p "List every dataset the paper uses" paper.pdf

  # Only convert to Markdown
  deepread --step parse paper.pdf

  # Summarise an existing Markdown file
  deepread notes.md

  # Several documents, three at a time, JSON report on stdout
  deepread -c 3 --json a.pdf b.pdf c.md > report.json

  # Check which settings are in effect (secrets are masked)
  deepread --show-config

SUMMARY STYLES:
  detailed (default), concise, bullet, academic, casual
  A file named <style>.md in the prompts directory overrides the built-in prompt.

ENVIRONMENT VARIABLES:
  GITEE_ACCESS_TOKEN      Gitee personal access token (remote flows)
  GITEE_OWNER             Repository owner
  GITEE_REPO              Repository name
  GITEE_BRANCH            Branch to upload to (default: master)
  GITEE_UPLOAD_PATH       Directory inside the repository (default: pdfs)
  MINERU_API_KEY          MinerU API key (remote flows)
  MINERU_API_URL          MinerU endpoint override
  MINERU_POLL_INTERVAL    Seconds between task status polls (default: 5)
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  DEEPREAD_LLM_PROVIDER   Override provider (anthropic, openai, gemini, ollama)
  DEEPREAD_MODEL          Override model ID
  DEEPREAD_MAX_TOKENS     Max summary tokens (default: 30000)
  DEEPREAD_PROMPTS_DIR    Prompt override directory (default: prompts)
  DEEPREAD_OUTPUT_DIR     Output directory (default: output)
  REQUEST_TIMEOUT         Per-request timeout in seconds (default: 300)
  MAX_RETRIES             Retries for transient failures (default: 3)
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)

  Variables are also read from a .env file in the working directory, or from
  the file given with --env-file.
"#;

/// Upload, parse and summarise PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "deepread",
    version,
    about = "Upload, parse and summarise PDF documents",
    long_about = "Turn PDF documents into Markdown and then into LLM-written summaries. \
PDFs are published to a Gitee repository and parsed by MinerU, or read locally with pdfium \
(--local). Summaries go through any provider supported by edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or Markdown files to process.
    #[arg(required_unless_present = "show_config")]
    inputs: Vec<PathBuf>,

    /// Write the summary to this file (single input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Summary style: detailed, concise, bullet, academic, casual.
    #[arg(short, long, env = "DEEPREAD_STYLE")]
    style: Option<SummaryStyle>,

    /// Custom summary instructions; replaces the style prompt.
    #[arg(short = 'p', long = "prompt")]
    prompt: Option<String>,

    /// Run only one half of the chain.
    #[arg(long, value_enum)]
    step: Option<StepArg>,

    /// Extract PDF text locally with pdfium instead of uploading.
    #[arg(long, env = "DEEPREAD_LOCAL")]
    local: bool,

    /// Directory for extracted documents and default summaries.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long)]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long)]
    model: Option<String>,

    /// Documents processed at the same time.
    #[arg(short, long, env = "DEEPREAD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Print a JSON report (final context and timings) on stdout.
    #[arg(long)]
    json: bool,

    /// Print the effective configuration with secrets masked, then exit.
    #[arg(long)]
    show_config: bool,

    /// Load environment variables from this file instead of ./.env.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, env = "DEEPREAD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StepArg {
    Parse,
    Summarize,
}

impl From<StepArg> for StepMode {
    fn from(v: StepArg) -> Self {
        match v {
            StepArg::Parse => StepMode::Parse,
            StepArg::Summarize => StepMode::Summarize,
        }
    }
}

/// One entry of the `--json` report.
#[derive(Serialize)]
struct DocumentReport<'a> {
    input: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a PipelineOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs while it is on screen.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.show_config;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Environment & configuration ──────────────────────────────────────
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = build_config(&cli)?;

    if cli.show_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&config.redacted_summary())
                .context("Failed to serialise configuration")?
        );
        return Ok(());
    }

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output can only be used with a single input file");
    }

    if cli.local && cli.step != Some(StepArg::Summarize) {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let mut factory = PipelineFactory::new(config);
    if let Some(cb) = &progress {
        factory = factory.progress_callback(Arc::clone(cb) as ProgressCallback);
    }

    let requests: Vec<ProcessRequest> = cli.inputs.iter().map(|p| request_for(&cli, p)).collect();

    let results = if let [request] = requests.as_slice() {
        vec![process(&factory, request).await]
    } else {
        process_batch(&factory, &requests, cli.concurrency).await
    };

    if let Some(cb) = &progress {
        cb.finish();
    }

    report(&cli, &requests, &results)
}

/// Map CLI args onto the environment-derived configuration.
fn build_config(cli: &Cli) -> Result<DeepReadConfig> {
    let mut config = DeepReadConfig::from_env().context("Invalid configuration")?;

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(provider) = &cli.provider {
        config.llm.provider_name = Some(provider.clone());
    }
    if let Some(model) = &cli.model {
        config.llm.model = Some(model.clone());
    }

    Ok(config)
}

fn request_for(cli: &Cli, input: &Path) -> ProcessRequest {
    let mut request = ProcessRequest::new(input).local(cli.local);
    if let Some(style) = cli.style {
        request = request.style(style);
    }
    if let Some(prompt) = &cli.prompt {
        request = request.custom_prompt(prompt.clone());
    }
    if let Some(output) = &cli.output {
        request = request.output_path(output.clone());
    }
    if let Some(step) = cli.step {
        request = request.step(step.into());
    }
    request
}

/// Print results and turn any failure into a non-zero exit.
fn report(
    cli: &Cli,
    requests: &[ProcessRequest],
    results: &[Result<PipelineOutput, DeepReadError>],
) -> Result<()> {
    if cli.json {
        let reports: Vec<DocumentReport<'_>> = requests
            .iter()
            .zip(results)
            .map(|(request, result)| DocumentReport {
                input: &request.input,
                output: result.as_ref().ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            })
            .collect();
        let json = if let [single] = reports.as_slice() {
            serde_json::to_string_pretty(single)
        } else {
            serde_json::to_string_pretty(&reports)
        }
        .context("Failed to serialise report")?;
        println!("{json}");
    }

    let mut failed = 0;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(output) => {
                if !cli.quiet && !cli.json {
                    eprintln!(
                        "{}  {}  {}ms  →  {}",
                        green("✔"),
                        request.input.display(),
                        output.stats.total_duration_ms,
                        bold(&result_location(output)),
                    );
                    let tokens = |key| output.context.get(key).and_then(|v| v.as_integer());
                    if let (Some(input), Some(output)) = (
                        tokens(keys::SUMMARY_INPUT_TOKENS),
                        tokens(keys::SUMMARY_OUTPUT_TOKENS),
                    ) {
                        eprintln!(
                            "   {} tokens in  /  {} tokens out",
                            dim(&input.to_string()),
                            dim(&output.to_string()),
                        );
                    }
                }
            }
            Err(e) => {
                failed += 1;
                if !cli.json {
                    eprintln!("{}  {}  {}", red("✘"), request.input.display(), red(&e.to_string()));
                }
            }
        }
    }

    match (failed, results.len()) {
        (0, _) => Ok(()),
        (1, 1) => match results.first() {
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")).context("Processing failed"),
            _ => Ok(()),
        },
        (n, total) => anyhow::bail!("{n} of {total} documents failed"),
    }
}

/// Where the interesting file of a finished run lives.
fn result_location(output: &PipelineOutput) -> String {
    [keys::OUTPUT_PATH, keys::MARKDOWN_PATH]
        .iter()
        .find_map(|key| output.context.get(key))
        .map(|value| match value {
            ContextValue::Path(path) => path.display().to_string(),
            ContextValue::Text(text) => text.clone(),
            other => format!("{other:?}"),
        })
        .unwrap_or_else(|| "(no file written)".to_string())
}

/// Make sure the pdfium engine used by local extraction is available.
///
/// The library (~30 MB) is downloaded once and cached; later runs only check
/// the cache path.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}
