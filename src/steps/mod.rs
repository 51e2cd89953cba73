//! Concrete pipeline steps.
//!
//! | Step           | Reads                                  | Writes |
//! |----------------|----------------------------------------|--------|
//! | `Upload`       | `pdf_path`                             | `remote_url`, `remote_page_url`, `original_filename` |
//! | `Parse`        | `remote_url`, `original_filename`?     | `markdown_path`, `markdown_content`, `markdown_length`, `extract_dir` |
//! | `LocalParse`   | `pdf_path`                             | `markdown_path`, `markdown_content`, `markdown_length`, `original_filename`, `extract_dir` |
//! | `LoadMarkdown` | `markdown_content` / `markdown_path` / `remote_markdown_url` | `markdown_content`, `markdown_length` |
//! | `Summarize`    | `markdown_content`, `style`?, `custom_prompt`? | `summary_text`, `summary_length`, `summary_input_tokens`, `summary_output_tokens` |
//! | `Save`         | `summary_text`, `output_path`?, `extract_dir`?, `markdown_path`? | `output_path` |
//!
//! Each step holds its collaborators behind `Arc<dyn …>` and nothing else,
//! so a single instance can be shared by concurrent runs.

pub mod local_parse;
pub mod markdown;
pub mod parse;
pub mod save;
pub mod summarize;
pub mod upload;

pub use local_parse::LocalParseStep;
pub use markdown::LoadMarkdownStep;
pub use parse::ParseStep;
pub use save::SaveStep;
pub use summarize::SummarizeStep;
pub use upload::UploadStep;

use crate::context::{keys, Context};
use std::path::{Path, PathBuf};

/// Fallback document name when the input carries none.
pub(crate) const DEFAULT_DOCUMENT_NAME: &str = "document";

/// `<output_dir>/<YYYYmmddHHMMSS>_<name>/`
pub(crate) fn extract_dir_for(output_dir: &Path, name: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    output_dir.join(format!("{stamp}_{name}"))
}

/// File stem used to name outputs derived from `path`.
pub(crate) fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string())
}

/// Store Markdown content and its length (in characters).
pub(crate) fn put_markdown(ctx: &mut Context, content: String) {
    let length = content.chars().count();
    ctx.insert(keys::MARKDOWN_LENGTH, length);
    ctx.insert(keys::MARKDOWN_CONTENT, content);
}
