//! Error types for the deepread library.
//!
//! Failures are layered the same way a pipeline run is:
//!
//! * [`MissingInputError`]: a step found one of its context keys absent or
//!   in the wrong shape. Raised before the step touches any collaborator.
//!
//! * [`CollaboratorError`]: an external service, the filesystem, or a local
//!   library call failed underneath a step (network, auth, quota, timeout,
//!   corrupt data).
//!
//! * [`StepError`]: what a [`crate::pipeline::Step`] returns: one of the two
//!   above, or a broken output contract.
//!
//! * [`PipelineAbortError`]: a `StepError` annotated with the pipeline name
//!   and the failing step. This is what [`crate::Pipeline::run`] surfaces.
//!
//! * [`DeepReadError`]: fatal errors from the top-level entry points
//!   (configuration, input validation, or an aborted run).

use crate::context::Context;
use std::path::PathBuf;
use thiserror::Error;

// ── Step inputs ──────────────────────────────────────────────────────────

/// Why a context key could not be used as a step input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputProblem {
    /// The key is not present in the context.
    Absent,
    /// The key is present but holds a different kind of value.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// The key holds an empty string.
    Empty,
    /// The key holds a value the step cannot interpret.
    Invalid(String),
}

impl std::fmt::Display for InputProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputProblem::Absent => write!(f, "key is absent"),
            InputProblem::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            InputProblem::Empty => write!(f, "value is empty"),
            InputProblem::Invalid(detail) => write!(f, "invalid value: {detail}"),
        }
    }
}

/// A step's required context key is absent or malformed.
#[derive(Debug, Clone, Error)]
#[error("step '{step}' requires context key '{key}': {problem}")]
pub struct MissingInputError {
    pub step: String,
    pub key: String,
    pub problem: InputProblem,
}

impl MissingInputError {
    pub fn new(step: impl Into<String>, key: impl Into<String>, problem: InputProblem) -> Self {
        Self {
            step: step.into(),
            key: key.into(),
            problem,
        }
    }

    pub fn absent(step: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(step, key, InputProblem::Absent)
    }
}

// ── Collaborators ────────────────────────────────────────────────────────

/// A failure inside an external collaborator a step depends on.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The call did not finish within its time budget.
    #[error("{service}: timeout after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("{service}: network error: {detail}")]
    Network { service: String, detail: String },

    /// The service answered with an unexpected HTTP status.
    #[error("{service}: HTTP {status}: {body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    /// The service rejected our credentials (401/403).
    #[error("{service}: authentication failed: {detail}")]
    Auth { service: String, detail: String },

    /// The service accepted the request but reported a processing failure.
    #[error("{service}: remote processing failed: {detail}")]
    Remote { service: String, detail: String },

    /// The service answered with a body we could not interpret.
    #[error("{service}: malformed response: {detail}")]
    MalformedResponse { service: String, detail: String },

    /// A downloaded archive could not be opened or extracted.
    #[error("Archive '{path}' is corrupt: {detail}")]
    CorruptArchive { path: PathBuf, detail: String },

    /// Filesystem read or write failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local PDF engine could not open or read a document.
    #[error("PDF '{path}': {detail}")]
    Pdf { path: PathBuf, detail: String },

    /// The language-model provider returned an error. `retryable` marks
    /// throttling, overload and transport failures.
    #[error("LLM error: {message}")]
    Llm { message: String, retryable: bool },
}

impl CollaboratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollaboratorError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(service: impl Into<String>, detail: impl Into<String>) -> Self {
        CollaboratorError::MalformedResponse {
            service: service.into(),
            detail: detail.into(),
        }
    }

    /// Map a `reqwest` transport error, distinguishing timeouts.
    pub fn from_reqwest(service: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout {
                service: service.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            CollaboratorError::malformed(service, err.to_string())
        } else {
            CollaboratorError::Network {
                service: service.to_string(),
                detail: err.to_string(),
            }
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => CollaboratorError::Auth {
                service: service.to_string(),
                detail: body,
            },
            code => CollaboratorError::Http {
                service: service.to_string(),
                status: code,
                body,
            },
        }
    }

    /// Whether a fresh attempt of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Timeout { .. } | CollaboratorError::Network { .. } => true,
            CollaboratorError::Http { status, .. } => *status == 429 || *status >= 500,
            CollaboratorError::Llm { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout { .. })
    }
}

// ── Steps and pipelines ──────────────────────────────────────────────────

/// Everything a single step execution can fail with.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    MissingInput(#[from] MissingInputError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The step reported success but did not write a key it declares.
    #[error("step finished without writing declared output '{key}'")]
    MissingOutput { key: String },
}

impl StepError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Collaborator(e) if e.is_timeout())
    }

    pub fn missing_input(&self) -> Option<&MissingInputError> {
        match self {
            StepError::MissingInput(e) => Some(e),
            _ => None,
        }
    }
}

/// A pipeline run stopped at its first failing step.
///
/// Carries the context as it was when the step failed, so callers can see
/// which keys earlier steps had already produced.
#[derive(Debug, Error)]
#[error("pipeline '{pipeline}' aborted at step {step_index}/{total_steps} '{step_name}': {source}")]
pub struct PipelineAbortError {
    pub pipeline: String,
    /// 1-indexed position of the failing step.
    pub step_index: usize,
    pub step_name: String,
    pub total_steps: usize,
    #[source]
    pub source: StepError,
    pub context: Box<Context>,
}

// ── Top level ────────────────────────────────────────────────────────────

/// Fatal errors returned by the deepread entry points.
#[derive(Debug, Error)]
pub enum DeepReadError {
    /// Configuration is missing settings the selected flow needs.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input path does not exist, is not a file, or has the wrong type.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// No flow handles this kind of input.
    #[error("Unsupported input '{path}': expected a .pdf or .md file")]
    UnsupportedInput { path: PathBuf },

    #[error(transparent)]
    Aborted(#[from] PipelineAbortError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_display_names_step_and_key() {
        let e = MissingInputError::absent("Upload", "pdf_path");
        let msg = e.to_string();
        assert!(msg.contains("Upload"), "got: {msg}");
        assert!(msg.contains("pdf_path"), "got: {msg}");
        assert!(msg.contains("absent"), "got: {msg}");
    }

    #[test]
    fn wrong_type_display() {
        let e = MissingInputError::new(
            "Summarize",
            "markdown_content",
            InputProblem::WrongType {
                expected: "text",
                found: "integer",
            },
        );
        assert!(e.to_string().contains("expected text, found integer"));
    }

    #[test]
    fn timeout_display_mentions_timeout() {
        let e = CollaboratorError::Timeout {
            service: "mineru".into(),
            secs: 300,
        };
        assert!(e.to_string().contains("timeout"));
        assert!(e.is_timeout());
        assert!(e.is_retryable());
    }

    #[test]
    fn http_retryable_only_for_transient_statuses() {
        let http = |status| CollaboratorError::Http {
            service: "gitee".into(),
            status,
            body: String::new(),
        };
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!CollaboratorError::Auth {
            service: "gitee".into(),
            detail: "bad token".into()
        }
        .is_retryable());
    }

    #[test]
    fn from_status_maps_auth() {
        let e = CollaboratorError::from_status(
            "mineru",
            reqwest::StatusCode::UNAUTHORIZED,
            "invalid key".into(),
        );
        assert!(matches!(e, CollaboratorError::Auth { .. }));
        assert!(e.to_string().contains("invalid key"));
    }

    #[test]
    fn abort_display_names_pipeline_and_step() {
        let e = PipelineAbortError {
            pipeline: "full".into(),
            step_index: 2,
            step_name: "Parse".into(),
            total_steps: 4,
            source: StepError::Collaborator(CollaboratorError::Timeout {
                service: "mineru".into(),
                secs: 5,
            }),
            context: Box::new(Context::new()),
        };
        let msg = e.to_string();
        assert!(msg.contains("'full'"), "got: {msg}");
        assert!(msg.contains("2/4 'Parse'"), "got: {msg}");
        assert!(msg.contains("timeout"), "got: {msg}");
        assert!(e.source.is_timeout());
    }
}
