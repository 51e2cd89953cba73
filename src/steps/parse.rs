use super::{extract_dir_for, put_markdown, DEFAULT_DOCUMENT_NAME};
use crate::context::{keys, Context};
use crate::error::{CollaboratorError, StepError};
use crate::pipeline::Step;
use crate::services::archive::PRIMARY_MARKDOWN;
use crate::services::{ArchiveExtractor, DocumentParser, ParsedDocument};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Turn the uploaded document into Markdown with the remote parser.
///
/// Results land in a fresh `<output_dir>/<timestamp>_<name>/` directory:
/// either the unpacked archive, or a single `full.md` when the parser
/// answers inline.
pub struct ParseStep {
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn ArchiveExtractor>,
    output_dir: PathBuf,
}

impl ParseStep {
    pub const NAME: &'static str = "Parse";

    pub fn new(
        parser: Arc<dyn DocumentParser>,
        extractor: Arc<dyn ArchiveExtractor>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser,
            extractor,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Step for ParseStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &[keys::REMOTE_URL]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[
            keys::MARKDOWN_PATH,
            keys::MARKDOWN_CONTENT,
            keys::MARKDOWN_LENGTH,
            keys::EXTRACT_DIR,
        ]
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError> {
        let url = ctx.require_text(Self::NAME, keys::REMOTE_URL)?.to_string();
        let name = ctx
            .optional_text(Self::NAME, keys::ORIGINAL_FILENAME)?
            .unwrap_or(DEFAULT_DOCUMENT_NAME)
            .to_string();

        let parsed = self.parser.parse(&url).await?;
        let dir = extract_dir_for(&self.output_dir, &name);

        let markdown_path = match parsed {
            ParsedDocument::Inline { markdown } => {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| CollaboratorError::io(&dir, e))?;
                let path = dir.join(PRIMARY_MARKDOWN);
                tokio::fs::write(&path, &markdown)
                    .await
                    .map_err(|e| CollaboratorError::io(&path, e))?;
                path
            }
            ParsedDocument::Archive { url, task_id } => {
                info!("Fetching result of task {}", task_id);
                self.extractor.fetch_and_extract(&url, &dir).await?.primary
            }
        };

        let content = tokio::fs::read_to_string(&markdown_path)
            .await
            .map_err(|e| CollaboratorError::io(&markdown_path, e))?;
        info!(
            "Parsed {} chars of Markdown into {}",
            content.chars().count(),
            markdown_path.display()
        );

        put_markdown(ctx, content);
        ctx.insert(keys::MARKDOWN_PATH, markdown_path);
        ctx.insert(keys::EXTRACT_DIR, dir);
        Ok(())
    }
}
