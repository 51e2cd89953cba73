//! The key-value state threaded through a pipeline run.
//!
//! A [`Context`] maps string keys to [`ContextValue`]s. Steps read the keys
//! they need through the `require_*` / `optional_*` accessors, which turn an
//! absent or mistyped value into a [`MissingInputError`] naming both the key
//! and the step, and write their results with [`Context::insert`].
//!
//! There is deliberately no way to remove a key: a step can add or overwrite
//! values, so the context a successful step leaves behind always contains
//! every key it was given.

use crate::error::{InputProblem, MissingInputError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Well-known context keys used by the built-in steps.
pub mod keys {
    /// Local PDF to process.
    pub const PDF_PATH: &str = "pdf_path";
    /// Summary style name (`detailed`, `concise`, ...).
    pub const STYLE: &str = "style";
    /// Prompt text that replaces the style prompt.
    pub const CUSTOM_PROMPT: &str = "custom_prompt";
    /// Input file name without extension.
    pub const ORIGINAL_FILENAME: &str = "original_filename";
    /// Publicly fetchable download URL of the uploaded PDF.
    pub const REMOTE_URL: &str = "remote_url";
    /// Human-facing page URL of the uploaded PDF.
    pub const REMOTE_PAGE_URL: &str = "remote_page_url";
    /// Remote Markdown file to summarise instead of a local one.
    pub const REMOTE_MARKDOWN_URL: &str = "remote_markdown_url";
    pub const MARKDOWN_PATH: &str = "markdown_path";
    pub const MARKDOWN_CONTENT: &str = "markdown_content";
    pub const MARKDOWN_LENGTH: &str = "markdown_length";
    /// Directory holding the parsed document and its auxiliary files.
    pub const EXTRACT_DIR: &str = "extract_dir";
    pub const SUMMARY_TEXT: &str = "summary_text";
    pub const SUMMARY_LENGTH: &str = "summary_length";
    pub const SUMMARY_INPUT_TOKENS: &str = "summary_input_tokens";
    pub const SUMMARY_OUTPUT_TOKENS: &str = "summary_output_tokens";
    /// Where the summary was (or should be) written.
    pub const OUTPUT_PATH: &str = "output_path";
}

/// A single value stored in a [`Context`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    Path(PathBuf),
    Bytes(Vec<u8>),
    Integer(i64),
    Bool(bool),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ContextValue::Text(_) => "text",
            ContextValue::Path(_) => "path",
            ContextValue::Bytes(_) => "bytes",
            ContextValue::Integer(_) => "integer",
            ContextValue::Bool(_) => "bool",
            ContextValue::Map(_) => "map",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ContextValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::Text(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::Text(v.to_string())
    }
}

impl From<PathBuf> for ContextValue {
    fn from(v: PathBuf) -> Self {
        ContextValue::Path(v)
    }
}

impl From<&std::path::Path> for ContextValue {
    fn from(v: &std::path::Path) -> Self {
        ContextValue::Path(v.to_path_buf())
    }
}

impl From<Vec<u8>> for ContextValue {
    fn from(v: Vec<u8>) -> Self {
        ContextValue::Bytes(v)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Integer(v)
    }
}

impl From<usize> for ContextValue {
    fn from(v: usize) -> Self {
        ContextValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}

impl From<BTreeMap<String, ContextValue>> for ContextValue {
    fn from(v: BTreeMap<String, ContextValue>) -> Self {
        ContextValue::Map(v)
    }
}

/// Shared key-value state for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for assembling an initial context.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ContextValue>,
    ) -> Option<ContextValue> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every key of `other` is also present here.
    pub fn is_superset_of(&self, other: &Context) -> bool {
        other.keys().all(|k| self.contains(k))
    }

    /// Non-empty text stored under `key`.
    pub fn require_text(&self, step: &str, key: &str) -> Result<&str, MissingInputError> {
        match self.optional_text(step, key)? {
            Some(s) => Ok(s),
            None => Err(MissingInputError::absent(step, key)),
        }
    }

    /// Text stored under `key`, if present. A present key holding another
    /// kind of value, or an empty string, is still an error.
    pub fn optional_text(&self, step: &str, key: &str) -> Result<Option<&str>, MissingInputError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ContextValue::Text(s)) if s.is_empty() => {
                Err(MissingInputError::new(step, key, InputProblem::Empty))
            }
            Some(ContextValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(MissingInputError::new(
                step,
                key,
                InputProblem::WrongType {
                    expected: "text",
                    found: other.kind(),
                },
            )),
        }
    }

    /// Filesystem path stored under `key`; text values are accepted as paths.
    pub fn require_path(&self, step: &str, key: &str) -> Result<PathBuf, MissingInputError> {
        match self.optional_path(step, key)? {
            Some(p) => Ok(p),
            None => Err(MissingInputError::absent(step, key)),
        }
    }

    pub fn optional_path(
        &self,
        step: &str,
        key: &str,
    ) -> Result<Option<PathBuf>, MissingInputError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ContextValue::Path(p)) if p.as_os_str().is_empty() => {
                Err(MissingInputError::new(step, key, InputProblem::Empty))
            }
            Some(ContextValue::Path(p)) => Ok(Some(p.clone())),
            Some(ContextValue::Text(_)) => {
                Ok(self.optional_text(step, key)?.map(PathBuf::from))
            }
            Some(other) => Err(MissingInputError::new(
                step,
                key,
                InputProblem::WrongType {
                    expected: "path",
                    found: other.kind(),
                },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_and_returns_previous() {
        let mut ctx = Context::new().with("style", "detailed");
        let prev = ctx.insert("style", "concise");
        assert_eq!(prev, Some(ContextValue::Text("detailed".into())));
        assert_eq!(ctx.get("style").and_then(|v| v.as_text()), Some("concise"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn require_text_reports_absent_key() {
        let ctx = Context::new();
        let err = ctx.require_text("Upload", keys::PDF_PATH).unwrap_err();
        assert_eq!(err.key, "pdf_path");
        assert_eq!(err.step, "Upload");
        assert_eq!(err.problem, InputProblem::Absent);
    }

    #[test]
    fn require_text_rejects_empty_and_wrong_type() {
        let ctx = Context::new()
            .with("empty", "")
            .with("count", 3_i64);
        assert_eq!(
            ctx.require_text("S", "empty").unwrap_err().problem,
            InputProblem::Empty
        );
        assert_eq!(
            ctx.require_text("S", "count").unwrap_err().problem,
            InputProblem::WrongType {
                expected: "text",
                found: "integer"
            }
        );
    }

    #[test]
    fn path_accessor_accepts_text_and_path() {
        let ctx = Context::new()
            .with("a", PathBuf::from("/tmp/a.pdf"))
            .with("b", "/tmp/b.pdf")
            .with("c", true);
        assert_eq!(ctx.require_path("S", "a").unwrap(), PathBuf::from("/tmp/a.pdf"));
        assert_eq!(ctx.require_path("S", "b").unwrap(), PathBuf::from("/tmp/b.pdf"));
        assert!(ctx.require_path("S", "c").is_err());
        assert_eq!(ctx.optional_path("S", "missing").unwrap(), None);
    }

    #[test]
    fn superset_check() {
        let small = Context::new().with("a", 1_i64);
        let big = small.clone().with("b", 2_i64);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
    }

    #[test]
    fn serialises_as_flat_json_object() {
        let ctx = Context::new()
            .with("pdf_path", PathBuf::from("a.pdf"))
            .with("markdown_length", 12_usize)
            .with("reused", false);
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["pdf_path"], "a.pdf");
        assert_eq!(json["markdown_length"], 12);
        assert_eq!(json["reused"], false);
    }
}
