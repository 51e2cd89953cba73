use super::{document_name, extract_dir_for, put_markdown};
use crate::context::{keys, Context};
use crate::error::{CollaboratorError, InputProblem, MissingInputError, StepError};
use crate::pipeline::Step;
use crate::services::archive::PRIMARY_MARKDOWN;
use crate::services::pdf::pages_to_markdown;
use crate::services::PdfTextExtractor;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Extract the PDF's text layer locally, without any network service.
///
/// Scanned documents have no text layer; they fail here rather than yielding
/// an empty summary later.
pub struct LocalParseStep {
    extractor: Arc<dyn PdfTextExtractor>,
    output_dir: PathBuf,
}

impl LocalParseStep {
    pub const NAME: &'static str = "LocalParse";

    pub fn new(extractor: Arc<dyn PdfTextExtractor>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Step for LocalParseStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &[keys::PDF_PATH]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[
            keys::MARKDOWN_PATH,
            keys::MARKDOWN_CONTENT,
            keys::MARKDOWN_LENGTH,
            keys::ORIGINAL_FILENAME,
            keys::EXTRACT_DIR,
        ]
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError> {
        let pdf_path = ctx.require_path(Self::NAME, keys::PDF_PATH)?;
        if !pdf_path.is_file() {
            return Err(MissingInputError::new(
                Self::NAME,
                keys::PDF_PATH,
                InputProblem::Invalid(format!("{} is not a readable file", pdf_path.display())),
            )
            .into());
        }

        let pages = self.extractor.extract_pages(&pdf_path).await?;
        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(CollaboratorError::Pdf {
                path: pdf_path,
                detail: "no extractable text (scanned document?)".to_string(),
            }
            .into());
        }

        let name = document_name(&pdf_path);
        let dir = extract_dir_for(&self.output_dir, &name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CollaboratorError::io(&dir, e))?;

        let markdown = pages_to_markdown(&pages);
        let markdown_path = dir.join(PRIMARY_MARKDOWN);
        tokio::fs::write(&markdown_path, &markdown)
            .await
            .map_err(|e| CollaboratorError::io(&markdown_path, e))?;
        info!(
            "Extracted {} pages from {} into {}",
            pages.len(),
            pdf_path.display(),
            markdown_path.display()
        );

        put_markdown(ctx, markdown);
        ctx.insert(keys::ORIGINAL_FILENAME, name);
        ctx.insert(keys::MARKDOWN_PATH, markdown_path);
        ctx.insert(keys::EXTRACT_DIR, dir);
        Ok(())
    }
}
