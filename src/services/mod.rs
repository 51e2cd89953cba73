//! External collaborators the steps depend on.
//!
//! Each collaborator is a trait so steps can be assembled with real HTTP
//! clients in production and in-process fakes in tests. The concrete
//! implementations take their settings from [`crate::DeepReadConfig`] at
//! construction time and hold no per-run state, so one instance can serve
//! concurrent runs.
//!
//! ## Retry Strategy
//!
//! Only transient failures (timeouts, connection errors, HTTP 429 and 5xx)
//! are retried, with exponential backoff (`backoff_ms * 2^attempt`).
//! Everything else surfaces on the first attempt.

pub mod archive;
pub mod parser;
pub mod pdf;
pub mod persistence;
pub mod storage;
pub mod summarizer;

pub use archive::{ArchiveExtractor, ExtractedArchive, ZipArchiveExtractor};
pub use parser::{DocumentParser, MineruClient, ParsedDocument};
pub use pdf::{PdfTextExtractor, PdfiumExtractor};
pub use persistence::{FsPersistence, Persistence};
pub use storage::{GiteeStore, ObjectStore, StoredObject};
pub use summarizer::{LlmSummarizer, Summarizer, Summary, SummaryRequest};

use crate::error::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a collaborator retries a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retries<T, F, Fut>(
    service: &str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.backoff(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms ({})",
                    service,
                    attempt,
                    policy.max_retries,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Build the shared HTTP client used by the network collaborators.
pub(crate) fn http_client(
    service: &str,
    timeout_secs: u64,
) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CollaboratorError::Network {
            service: service.to_string(),
            detail: format!("cannot build HTTP client: {e}"),
        })
}

/// Read a response body as text for error reporting, capped in length.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 500 {
        let mut cut = 500;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}
