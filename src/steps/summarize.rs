use crate::context::{keys, Context};
use crate::error::{CollaboratorError, InputProblem, MissingInputError, StepError};
use crate::pipeline::Step;
use crate::postprocess::clean_summary;
use crate::prompts::{PromptLibrary, SummaryStyle};
use crate::services::{Summarizer, SummaryRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Summarise `markdown_content` with the configured model.
///
/// `custom_prompt` replaces the style prompt entirely; otherwise `style`
/// (default `detailed`) picks one from the prompt library.
pub struct SummarizeStep {
    summarizer: Arc<dyn Summarizer>,
    prompts: PromptLibrary,
}

impl SummarizeStep {
    pub const NAME: &'static str = "Summarize";

    pub fn new(summarizer: Arc<dyn Summarizer>, prompts: PromptLibrary) -> Self {
        Self { summarizer, prompts }
    }
}

#[async_trait]
impl Step for SummarizeStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &[keys::MARKDOWN_CONTENT]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[
            keys::SUMMARY_TEXT,
            keys::SUMMARY_LENGTH,
            keys::SUMMARY_INPUT_TOKENS,
            keys::SUMMARY_OUTPUT_TOKENS,
        ]
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError> {
        let content = ctx.require_text(Self::NAME, keys::MARKDOWN_CONTENT)?.to_string();
        let style = match ctx.optional_text(Self::NAME, keys::STYLE)? {
            Some(raw) => raw.parse::<SummaryStyle>().map_err(|detail| {
                MissingInputError::new(Self::NAME, keys::STYLE, InputProblem::Invalid(detail))
            })?,
            None => SummaryStyle::default(),
        };
        let custom = ctx
            .optional_text(Self::NAME, keys::CUSTOM_PROMPT)?
            .map(str::to_string);

        let system_prompt = self.prompts.resolve(style, custom.as_deref()).await;
        info!(
            "Summarising {} chars ({})",
            content.chars().count(),
            if custom.is_some() { "custom prompt".to_string() } else { format!("style: {style}") }
        );

        let summary = self
            .summarizer
            .summarize(&SummaryRequest {
                system_prompt,
                content,
            })
            .await?;

        let text = clean_summary(&summary.text);
        if text.is_empty() {
            return Err(CollaboratorError::Llm {
                message: "model returned an empty summary".to_string(),
                retryable: false,
            }
            .into());
        }

        ctx.insert(keys::SUMMARY_LENGTH, text.chars().count());
        ctx.insert(keys::SUMMARY_INPUT_TOKENS, summary.input_tokens);
        ctx.insert(keys::SUMMARY_OUTPUT_TOKENS, summary.output_tokens);
        ctx.insert(keys::SUMMARY_TEXT, text);
        Ok(())
    }
}
