//! Local PDF text extraction through pdfium.
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks; all calls therefore run inside `spawn_blocking`.
//! `pdfium-auto` locates (or downloads and caches) the shared library on
//! first use.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    /// Text of every page, in page order.
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>, CollaboratorError>;
}

#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Password for encrypted documents.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[async_trait]
impl PdfTextExtractor for PdfiumExtractor {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>, CollaboratorError> {
        let owned = path.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || extract_blocking(&owned, password.as_deref()))
            .await
            .map_err(|e| CollaboratorError::Pdf {
                path: path.to_path_buf(),
                detail: format!("extraction task panicked: {e}"),
            })?
    }
}

fn extract_blocking(path: &Path, password: Option<&str>) -> Result<Vec<String>, CollaboratorError> {
    let pdf_err = |detail: String| CollaboratorError::Pdf {
        path: PathBuf::from(path),
        detail,
    };

    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| pdf_err(format!("cannot load the pdfium engine: {e}")))?;

    let document = pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            pdf_err("document is password-protected".to_string())
        } else {
            pdf_err(detail)
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| pdf_err(format!("page {}: {e:?}", idx + 1)))?
            .all();
        debug!("Page {}: {} chars", idx + 1, text.chars().count());
        texts.push(text);
    }
    Ok(texts)
}

/// Join page texts into one Markdown document with page markers.
pub fn pages_to_markdown(pages: &[String]) -> String {
    let mut out = String::new();
    for (idx, text) in pages.iter().enumerate() {
        if idx > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("<!-- page {} -->\n\n", idx + 1));
        out.push_str(text.trim());
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_marked_in_order() {
        let md = pages_to_markdown(&["First page\n".to_string(), "  Second".to_string()]);
        assert_eq!(
            md,
            "<!-- page 1 -->\n\nFirst page\n\n<!-- page 2 -->\n\nSecond\n"
        );
    }
}
