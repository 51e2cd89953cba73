//! LLM summarisation.
//!
//! One chat completion per document: system prompt plus Markdown in, raw
//! summary text out. Prompt wording lives in [`crate::prompts`], output
//! cleanup in [`crate::postprocess`].

use super::{with_retries, RetryPolicy};
use crate::config::DeepReadConfig;
use crate::error::CollaboratorError;
use crate::prompts::document_message;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SERVICE: &str = "llm";

/// Provider messages that mean the credentials were refused.
static RE_AUTH_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(401|403)\b|unauthori[sz]ed|forbidden|authentication",
        r"|invalid.{0,10}api.?key|permission denied",
    ))
    .unwrap()
});

/// Throttling, overload, 5xx and transport failures.
static RE_TRANSIENT_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(429|500|502|503|504|529)\b|rate.?limit|too many requests",
        r"|overloaded|unavailable|timed? ?out|connection|network",
    ))
    .unwrap()
});

static RE_QUOTA_FAILURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)quota|insufficient|billing|credit balance").unwrap());

/// Input for one summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub system_prompt: String,
    pub content: String,
}

/// A generated summary and its token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<Summary, CollaboratorError>;
}

/// Summarizer backed by any `edgequake_llm` provider.
pub struct LlmSummarizer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSummarizer")
            .field("provider", &"<dyn LLMProvider>")
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &DeepReadConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.request_timeout_secs,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<Summary, CollaboratorError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user(document_message(&request.content)),
        ];

        let summary = with_retries(SERVICE, self.retry, || self.complete(&messages)).await?;
        debug!(
            "Summary: {} input tokens, {} output tokens, {:?}",
            summary.input_tokens,
            summary.output_tokens,
            start.elapsed()
        );
        Ok(summary)
    }
}

impl LlmSummarizer {
    /// One chat completion under the request timeout.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Summary, CollaboratorError> {
        let call = self.provider.chat(messages, Some(&self.options));
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), call).await {
            Ok(Ok(response)) => Ok(Summary {
                text: response.content,
                input_tokens: response.prompt_tokens as usize,
                output_tokens: response.completion_tokens as usize,
            }),
            Ok(Err(e)) => {
                let err = classify_provider_error(e.to_string());
                warn!("Summary: provider call failed: {}", err);
                Err(err)
            }
            Err(_) => Err(CollaboratorError::Timeout {
                service: SERVICE.to_string(),
                secs: self.timeout_secs,
            }),
        }
    }
}

/// Map a provider error message onto the collaborator taxonomy.
///
/// Authentication failures become [`CollaboratorError::Auth`]; throttling,
/// overload and transport failures stay retryable; quota exhaustion and
/// anything unrecognised surface on the first attempt.
fn classify_provider_error(message: String) -> CollaboratorError {
    if RE_AUTH_FAILURE.is_match(&message) {
        return CollaboratorError::Auth {
            service: SERVICE.to_string(),
            detail: message,
        };
    }
    let retryable =
        !RE_QUOTA_FAILURE.is_match(&message) && RE_TRANSIENT_FAILURE.is_match(&message);
    CollaboratorError::Llm { message, retryable }
}

/// Build `CompletionOptions` from the LLM section of the config.
fn build_options(config: &DeepReadConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.llm.temperature),
        max_tokens: Some(config.llm.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_credentials_are_not_retried() {
        for message in [
            "API error 401: invalid x-api-key",
            "Unauthorized",
            "Invalid API key provided",
        ] {
            let err = classify_provider_error(message.to_string());
            assert!(matches!(err, CollaboratorError::Auth { .. }), "{message}");
            assert!(!err.is_retryable(), "{message}");
        }
    }

    #[test]
    fn quota_exhaustion_is_not_retried() {
        let err = classify_provider_error(
            "429: You exceeded your current quota, please check your billing details".to_string(),
        );
        assert!(matches!(err, CollaboratorError::Llm { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn throttling_and_overload_are_retried() {
        for message in [
            "Rate limit exceeded, retry later",
            "HTTP 529: overloaded_error",
            "503 Service Unavailable",
            "error sending request: connection reset",
        ] {
            assert!(classify_provider_error(message.to_string()).is_retryable(), "{message}");
        }
    }

    #[test]
    fn unrecognised_errors_surface_immediately() {
        let err = classify_provider_error("model 'nope' does not exist".to_string());
        assert_eq!(err.to_string(), "LLM error: model 'nope' does not exist");
        assert!(!err.is_retryable());
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&DeepReadConfig::default());
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(30_000));
    }
}
