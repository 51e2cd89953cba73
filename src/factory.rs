//! Preconfigured pipelines for the known flows.
//!
//! The factory only assembles: it resolves each collaborator (an injected
//! override, or one built from [`DeepReadConfig`]), wraps it in the matching
//! step, and hands back a [`Pipeline`]. It never runs anything.

use crate::config::{DeepReadConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_OPENAI_MODEL};
use crate::error::DeepReadError;
use crate::pipeline::Pipeline;
use crate::progress::ProgressCallback;
use crate::prompts::PromptLibrary;
use crate::services::{
    ArchiveExtractor, DocumentParser, FsPersistence, GiteeStore, LlmSummarizer, MineruClient,
    ObjectStore, PdfTextExtractor, PdfiumExtractor, Persistence, Summarizer, ZipArchiveExtractor,
};
use crate::steps::{
    LoadMarkdownStep, LocalParseStep, ParseStep, SaveStep, SummarizeStep, UploadStep,
};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flow {
    /// Upload → Parse → Summarize → Save
    Full,
    /// LocalParse → Summarize → Save
    Local,
    /// LoadMarkdown → Summarize → Save
    SummaryOnly,
    /// Upload → Parse
    ParseOnly,
    /// LocalParse
    LocalParseOnly,
}

impl Flow {
    pub const ALL: [Flow; 5] = [
        Flow::Full,
        Flow::Local,
        Flow::SummaryOnly,
        Flow::ParseOnly,
        Flow::LocalParseOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Full => "full",
            Flow::Local => "local",
            Flow::SummaryOnly => "summary-only",
            Flow::ParseOnly => "parse-only",
            Flow::LocalParseOnly => "local-parse-only",
        }
    }

    /// Whether the flow uploads the PDF and calls the remote parser.
    pub fn uses_remote_parser(&self) -> bool {
        matches!(self, Flow::Full | Flow::ParseOnly)
    }

    /// Whether the flow calls the language model.
    pub fn summarizes(&self) -> bool {
        matches!(self, Flow::Full | Flow::Local | Flow::SummaryOnly)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds pipelines for each [`Flow`].
///
/// Collaborators set through the `with_*` methods take precedence over the
/// ones the factory would build from the configuration; that is how tests
/// run full flows without network access.
///
/// # Example
/// ```rust
/// use deepread::{DeepReadConfig, PipelineFactory};
///
/// let factory = PipelineFactory::new(DeepReadConfig::default());
/// let pipeline = factory.local_parse_only().unwrap();
/// assert_eq!(pipeline.step_names(), vec!["LocalParse"]);
/// ```
#[derive(Clone)]
pub struct PipelineFactory {
    config: DeepReadConfig,
    storage: Option<Arc<dyn ObjectStore>>,
    parser: Option<Arc<dyn DocumentParser>>,
    extractor: Option<Arc<dyn ArchiveExtractor>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    pdf_extractor: Option<Arc<dyn PdfTextExtractor>>,
    persistence: Option<Arc<dyn Persistence>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for PipelineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let injected = |set: bool| if set { "injected" } else { "from config" };
        f.debug_struct("PipelineFactory")
            .field("config", &self.config)
            .field("storage", &injected(self.storage.is_some()))
            .field("parser", &injected(self.parser.is_some()))
            .field("extractor", &injected(self.extractor.is_some()))
            .field("summarizer", &injected(self.summarizer.is_some()))
            .field("pdf_extractor", &injected(self.pdf_extractor.is_some()))
            .field("persistence", &injected(self.persistence.is_some()))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl PipelineFactory {
    pub fn new(config: DeepReadConfig) -> Self {
        Self {
            config,
            storage: None,
            parser: None,
            extractor: None,
            summarizer: None,
            pdf_extractor: None,
            persistence: None,
            progress: None,
        }
    }

    pub fn config(&self) -> &DeepReadConfig {
        &self.config
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf_extractor = Some(extractor);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Attach a progress callback to every pipeline built from now on.
    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Upload → Parse → Summarize → Save
    pub fn full(&self) -> Result<Pipeline, DeepReadError> {
        self.for_flow(Flow::Full)
    }

    /// LocalParse → Summarize → Save
    pub fn local(&self) -> Result<Pipeline, DeepReadError> {
        self.for_flow(Flow::Local)
    }

    /// LoadMarkdown → Summarize → Save
    pub fn summary_only(&self) -> Result<Pipeline, DeepReadError> {
        self.for_flow(Flow::SummaryOnly)
    }

    /// Upload → Parse
    pub fn parse_only(&self) -> Result<Pipeline, DeepReadError> {
        self.for_flow(Flow::ParseOnly)
    }

    /// LocalParse
    pub fn local_parse_only(&self) -> Result<Pipeline, DeepReadError> {
        self.for_flow(Flow::LocalParseOnly)
    }

    pub fn for_flow(&self, flow: Flow) -> Result<Pipeline, DeepReadError> {
        // Remote credentials matter only for collaborators we have to build.
        if flow.uses_remote_parser() && (self.storage.is_none() || self.parser.is_none()) {
            self.config.validate_for(flow)?;
        }

        let mut pipeline = Pipeline::new(flow.as_str());
        if let Some(progress) = &self.progress {
            pipeline = pipeline.with_progress(Arc::clone(progress));
        }

        let output_dir = self.config.output_dir.clone();
        match flow {
            Flow::Full | Flow::ParseOnly => {
                pipeline = pipeline
                    .add_step(UploadStep::new(self.storage()?))
                    .add_step(ParseStep::new(self.parser()?, self.extractor()?, &output_dir));
            }
            Flow::Local | Flow::LocalParseOnly => {
                pipeline =
                    pipeline.add_step(LocalParseStep::new(self.pdf_extractor(), &output_dir));
            }
            Flow::SummaryOnly => {
                pipeline =
                    pipeline.add_step(LoadMarkdownStep::new(self.config.request_timeout_secs));
            }
        }

        if flow.summarizes() {
            pipeline = pipeline
                .add_step(SummarizeStep::new(
                    self.summarizer()?,
                    PromptLibrary::new(&self.config.prompts_dir),
                ))
                .add_step(SaveStep::new(self.persistence(), &output_dir));
        }

        debug!("Built pipeline '{}': {:?}", flow, pipeline.step_names());
        Ok(pipeline)
    }

    fn storage(&self) -> Result<Arc<dyn ObjectStore>, DeepReadError> {
        match &self.storage {
            Some(s) => Ok(Arc::clone(s)),
            None => Ok(Arc::new(GiteeStore::new(&self.config)?)),
        }
    }

    fn parser(&self) -> Result<Arc<dyn DocumentParser>, DeepReadError> {
        match &self.parser {
            Some(p) => Ok(Arc::clone(p)),
            None => Ok(Arc::new(MineruClient::new(&self.config)?)),
        }
    }

    fn extractor(&self) -> Result<Arc<dyn ArchiveExtractor>, DeepReadError> {
        match &self.extractor {
            Some(e) => Ok(Arc::clone(e)),
            None => Ok(Arc::new(ZipArchiveExtractor::new(&self.config)?)),
        }
    }

    fn pdf_extractor(&self) -> Arc<dyn PdfTextExtractor> {
        match &self.pdf_extractor {
            Some(e) => Arc::clone(e),
            None => Arc::new(PdfiumExtractor::new()),
        }
    }

    fn persistence(&self) -> Arc<dyn Persistence> {
        match &self.persistence {
            Some(p) => Arc::clone(p),
            None => Arc::new(FsPersistence),
        }
    }

    fn summarizer(&self) -> Result<Arc<dyn Summarizer>, DeepReadError> {
        if let Some(s) = &self.summarizer {
            return Ok(Arc::clone(s));
        }
        let provider = resolve_provider(&self.config)?;
        Ok(Arc::new(LlmSummarizer::new(provider, &self.config)))
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.llm.provider`), used as-is.
/// 2. **Named provider** (`config.llm.provider_name`) with `config.llm.model`,
///    or the default model for anthropic/openai.
/// 3. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &DeepReadConfig) -> Result<Arc<dyn LLMProvider>, DeepReadError> {
    if let Some(provider) = &config.llm.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = &config.llm.provider_name {
        let model = match (config.llm.model.as_deref(), name.as_str()) {
            (Some(model), _) => model,
            (None, "anthropic") => DEFAULT_ANTHROPIC_MODEL,
            (None, "openai") => DEFAULT_OPENAI_MODEL,
            (None, other) => {
                return Err(DeepReadError::InvalidConfig(format!(
                    "DEEPREAD_MODEL must be set for provider '{other}'"
                )))
            }
        };
        return ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            DeepReadError::InvalidConfig(format!("LLM provider '{name}' is not usable: {e}"))
        });
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        DeepReadError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or DEEPREAD_LLM_PROVIDER.\n\
             Error: {e}"
        ))
    })?;
    Ok(llm_provider)
}
