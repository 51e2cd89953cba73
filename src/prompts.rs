//! System prompts for document summarisation.
//!
//! Every built-in prompt lives here so the wording can change without
//! touching the summarise step or its retry logic. A file named
//! `<style>.md` inside the configured prompts directory replaces the
//! built-in text for that style; a custom prompt in the context replaces
//! both.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// How a summary should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    /// Thorough report: key points, detailed content, conclusions. (default)
    #[default]
    Detailed,
    /// A few short paragraphs.
    Concise,
    /// Bullet points only.
    Bullet,
    /// Abstract-style summary for research papers.
    Academic,
    /// Plain-language explanation.
    Casual,
}

impl SummaryStyle {
    pub const ALL: [SummaryStyle; 5] = [
        SummaryStyle::Detailed,
        SummaryStyle::Concise,
        SummaryStyle::Bullet,
        SummaryStyle::Academic,
        SummaryStyle::Casual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Detailed => "detailed",
            SummaryStyle::Concise => "concise",
            SummaryStyle::Bullet => "bullet",
            SummaryStyle::Academic => "academic",
            SummaryStyle::Casual => "casual",
        }
    }

    /// The built-in system prompt for this style.
    pub fn builtin_prompt(&self) -> &'static str {
        match self {
            SummaryStyle::Detailed => DETAILED_PROMPT,
            SummaryStyle::Concise => CONCISE_PROMPT,
            SummaryStyle::Bullet => BULLET_PROMPT,
            SummaryStyle::Academic => ACADEMIC_PROMPT,
            SummaryStyle::Casual => CASUAL_PROMPT,
        }
    }
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        SummaryStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown summary style '{s}' (expected one of: detailed, concise, bullet, academic, casual)"
                )
            })
    }
}

/// Default prompt: the full report used when no style is given.
pub const DETAILED_PROMPT: &str = r#"You are a professional document analyst. Read the Markdown document carefully and write a detailed summary report.

Requirements:
1. Be thorough: cover every key piece of information in the document
2. Keep the logic clear and the structure complete
3. Write the output in Markdown
4. Include these sections:
   - Key points
   - Detailed content
   - Main conclusions
   - Practical recommendations (if applicable)

Output ONLY the summary. Do NOT wrap it in ```markdown fences."#;

pub const CONCISE_PROMPT: &str = r#"You are a professional document analyst. Summarise the Markdown document in at most three short paragraphs.

Focus on the main purpose, the central findings, and the most important conclusion. Write in Markdown and output ONLY the summary."#;

pub const BULLET_PROMPT: &str = r#"You are a professional document analyst. Summarise the Markdown document as a list of 5 to 10 bullet points.

Each bullet must state one key idea in a single sentence. Order bullets by importance. Output ONLY the Markdown list."#;

pub const ACADEMIC_PROMPT: &str = r#"You are reviewing a research paper. Write a structured academic summary in Markdown with these sections:

## Research question
## Method
## Results
## Contributions
## Limitations

Preserve important numbers, datasets, and formulas (LaTeX: $inline$, $$display$$). Output ONLY the summary."#;

pub const CASUAL_PROMPT: &str = r#"Explain the Markdown document to a curious reader with no background in the subject.

Use plain language, short sentences, and one or two concrete examples. Avoid jargon, or define it when it cannot be avoided. Write in Markdown and output ONLY the explanation."#;

/// Resolves the system prompt for a summary request.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pick the system prompt: custom prompt, then `<dir>/<style>.md`, then
    /// the built-in text.
    pub async fn resolve(&self, style: SummaryStyle, custom: Option<&str>) -> String {
        if let Some(custom) = custom {
            return custom.to_string();
        }

        let file = self.dir.join(format!("{}.md", style.as_str()));
        match tokio::fs::read_to_string(&file).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Using prompt file {}", file.display());
                text
            }
            _ => style.builtin_prompt().to_string(),
        }
    }
}

/// Wrap the document for the user turn of the summary request.
pub fn document_message(markdown: &str) -> String {
    format!("Document content:\n\n{}", markdown)
}
