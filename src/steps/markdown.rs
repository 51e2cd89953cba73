use super::put_markdown;
use crate::context::{keys, Context};
use crate::error::{CollaboratorError, InputProblem, MissingInputError, StepError};
use crate::pipeline::Step;
use crate::services::{error_body, http_client};
use async_trait::async_trait;
use tracing::{debug, info};

const SERVICE: &str = "markdown";

/// Make sure the context holds the Markdown to summarise.
///
/// Sources, first match wins: `markdown_content` already in the context,
/// the file at `markdown_path`, the document at `remote_markdown_url`.
pub struct LoadMarkdownStep {
    timeout_secs: u64,
}

impl LoadMarkdownStep {
    pub const NAME: &'static str = "LoadMarkdown";

    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    async fn fetch(&self, url: &str) -> Result<String, CollaboratorError> {
        let client = http_client(SERVICE, self.timeout_secs)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(CollaboratorError::from_status(SERVICE, status, body));
        }
        response
            .text()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))
    }
}

impl Default for LoadMarkdownStep {
    fn default() -> Self {
        Self::new(300)
    }
}

#[async_trait]
impl Step for LoadMarkdownStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn produces(&self) -> &'static [&'static str] {
        &[keys::MARKDOWN_CONTENT, keys::MARKDOWN_LENGTH]
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError> {
        if let Some(existing) = ctx.optional_text(Self::NAME, keys::MARKDOWN_CONTENT)? {
            debug!("Markdown already in context ({} bytes)", existing.len());
            let existing = existing.to_string();
            put_markdown(ctx, existing);
            return Ok(());
        }

        let content = if let Some(path) = ctx.optional_path(Self::NAME, keys::MARKDOWN_PATH)? {
            if !path.is_file() {
                return Err(MissingInputError::new(
                    Self::NAME,
                    keys::MARKDOWN_PATH,
                    InputProblem::Invalid(format!("{} is not a readable file", path.display())),
                )
                .into());
            }
            info!("Reading Markdown from {}", path.display());
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CollaboratorError::io(&path, e))?
        } else if let Some(url) = ctx.optional_text(Self::NAME, keys::REMOTE_MARKDOWN_URL)? {
            let url = url.to_string();
            info!("Fetching Markdown from {}", url);
            self.fetch(&url).await?
        } else {
            return Err(MissingInputError::absent(Self::NAME, keys::MARKDOWN_PATH).into());
        };

        if content.trim().is_empty() {
            let problem = InputProblem::Empty;
            return Err(MissingInputError::new(Self::NAME, keys::MARKDOWN_CONTENT, problem).into());
        }

        put_markdown(ctx, content);
        Ok(())
    }
}
