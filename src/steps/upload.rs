use super::document_name;
use crate::context::{keys, Context};
use crate::error::{InputProblem, MissingInputError, StepError};
use crate::pipeline::Step;
use crate::services::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Publish the local PDF so a remote parser can fetch it.
pub struct UploadStep {
    store: Arc<dyn ObjectStore>,
}

impl UploadStep {
    pub const NAME: &'static str = "Upload";

    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Step for UploadStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &[keys::PDF_PATH]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[keys::REMOTE_URL, keys::REMOTE_PAGE_URL, keys::ORIGINAL_FILENAME]
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

        let stored = self.store.upload(&pdf_path).await?;
        info!(
            "{} available at {}{}",
            pdf_path.display(),
            stored.download_url,
            if stored.reused { " (reused)" } else { "" }
        );

        let page_url = stored.page_url.unwrap_or_else(|| stored.download_url.clone());
        ctx.insert(keys::ORIGINAL_FILENAME, document_name(&pdf_path));
        ctx.insert(keys::REMOTE_PAGE_URL, page_url);
        ctx.insert(keys::REMOTE_URL, stored.download_url);
        Ok(())
    }
}
