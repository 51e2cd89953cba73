//! Remote document parsing.
//!
//! [`MineruClient`] submits a public PDF URL to MinerU, then polls the task
//! until it is done, failed, or out of time. MinerU answers with a zip
//! archive of Markdown and assets; fetching and unpacking it is the job of
//! [`super::ArchiveExtractor`].
//!
//! Every MinerU response is wrapped as `{"code": 0, "msg": "ok", "data": {…}}`;
//! a non-zero `code` is a remote failure regardless of the HTTP status.

use super::{error_body, http_client, with_retries, RetryPolicy};
use crate::config::DeepReadConfig;
use crate::error::{CollaboratorError, DeepReadError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SERVICE: &str = "mineru";

/// What a parser produced for a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDocument {
    /// Markdown returned directly in the response.
    Inline { markdown: String },
    /// Markdown packed in an archive that still has to be downloaded.
    Archive { url: String, task_id: String },
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Convert the document at a publicly reachable `url` to Markdown.
    async fn parse(&self, url: &str) -> Result<ParsedDocument, CollaboratorError>;
}

/// State of a MinerU extraction task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running { extracted_pages: u64, total_pages: u64 },
    Converting,
    Done { zip_url: Option<String> },
    Failed { message: String },
    Unknown(String),
}

#[derive(Debug, Clone)]
pub struct MineruClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    poll_interval: Duration,
    timeout_secs: u64,
    retry: RetryPolicy,
    is_ocr: bool,
    enable_formula: bool,
}

impl MineruClient {
    pub fn new(config: &DeepReadConfig) -> Result<Self, DeepReadError> {
        let api_key = config
            .mineru
            .api_key
            .clone()
            .ok_or_else(|| DeepReadError::InvalidConfig("MINERU_API_KEY is not set".into()))?;
        let client = http_client(SERVICE, config.request_timeout_secs)
            .map_err(|e| DeepReadError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.mineru.api_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_secs(config.mineru.poll_interval_secs.max(1)),
            timeout_secs: config.request_timeout_secs,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
            is_ocr: config.mineru.is_ocr,
            enable_formula: config.mineru.enable_formula,
        })
    }

    pub fn task_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.api_url, task_id)
    }

    async fn submit(&self, url: &str) -> Result<String, CollaboratorError> {
        let payload = json!({
            "url": url,
            "is_ocr": self.is_ocr,
            "enable_formula": self.enable_formula,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;

        let body = read_envelope(response, self.timeout_secs).await?;
        body.get("data")
            .and_then(|d| d.get("task_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, format!("no task_id in {body}")))
    }

    async fn poll_once(&self, task_id: &str) -> Result<TaskState, CollaboratorError> {
        let response = self
            .client
            .get(self.task_url(task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;

        let body = read_envelope(response, self.timeout_secs).await?;
        Ok(task_state(&body))
    }

    /// Poll until the task settles or the overall deadline passes.
    async fn wait_for(&self, task_id: &str) -> Result<String, CollaboratorError> {
        let deadline = Instant::now() + Duration::from_secs(self.timeout_secs);

        loop {
            if Instant::now() >= deadline {
                return Err(CollaboratorError::Timeout {
                    service: SERVICE.to_string(),
                    secs: self.timeout_secs,
                });
            }

            match self.poll_once(task_id).await {
                Ok(TaskState::Done { zip_url: Some(url) }) => {
                    info!("MinerU task {} done", task_id);
                    return Ok(url);
                }
                Ok(TaskState::Done { zip_url: None }) => {
                    return Err(CollaboratorError::malformed(
                        SERVICE,
                        format!("task {task_id} finished without full_zip_url"),
                    ));
                }
                Ok(TaskState::Failed { message }) => {
                    return Err(CollaboratorError::Remote {
                        service: SERVICE.to_string(),
                        detail: message,
                    });
                }
                Ok(TaskState::Running {
                    extracted_pages,
                    total_pages,
                }) if total_pages > 0 => {
                    info!("MinerU task {}: {}/{} pages", task_id, extracted_pages, total_pages);
                }
                Ok(state) => debug!("MinerU task {}: {:?}", task_id, state),
                Err(e) if e.is_retryable() => {
                    warn!("MinerU task {}: status check failed ({}); still waiting", task_id, e);
                }
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

#[async_trait]
impl DocumentParser for MineruClient {
    async fn parse(&self, url: &str) -> Result<ParsedDocument, CollaboratorError> {
        info!("Submitting {} to MinerU", url);
        let task_id = with_retries(SERVICE, self.retry, || self.submit(url)).await?;
        info!("MinerU task created: {}", task_id);

        let zip_url = self.wait_for(&task_id).await?;
        Ok(ParsedDocument::Archive {
            url: zip_url,
            task_id,
        })
    }
}

/// Decode a MinerU response and unwrap its `{code, msg, data}` envelope.
async fn read_envelope(
    response: reqwest::Response,
    timeout_secs: u64,
) -> Result<Value, CollaboratorError> {
    let status = response.status();
    if !status.is_success() {
        let body = error_body(response).await;
        return Err(CollaboratorError::from_status(SERVICE, status, body));
    }
    let body: Value = response.json().await.map_err(|e| {
        if e.is_timeout() {
            CollaboratorError::from_reqwest(SERVICE, e, timeout_secs)
        } else {
            CollaboratorError::malformed(SERVICE, e.to_string())
        }
    })?;
    check_code(&body)?;
    Ok(body)
}

fn check_code(body: &Value) -> Result<(), CollaboratorError> {
    match body.get("code").and_then(Value::as_i64) {
        Some(0) => Ok(()),
        Some(_) => Err(CollaboratorError::Remote {
            service: SERVICE.to_string(),
            detail: body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        None => Err(CollaboratorError::malformed(SERVICE, format!("no code in {body}"))),
    }
}

/// Read the task state out of a status response.
pub fn task_state(body: &Value) -> TaskState {
    let data = body.get("data").unwrap_or(&Value::Null);
    let text = |key: &str| data.get(key).and_then(Value::as_str);

    match text("state").unwrap_or_default() {
        "pending" => TaskState::Pending,
        "running" => {
            let progress = data.get("extract_progress").unwrap_or(&Value::Null);
            let count = |key: &str| progress.get(key).and_then(Value::as_u64).unwrap_or(0);
            TaskState::Running {
                extracted_pages: count("extracted_pages"),
                total_pages: count("total_pages"),
            }
        }
        "converting" => TaskState::Converting,
        "done" => TaskState::Done {
            zip_url: text("full_zip_url").filter(|u| !u.is_empty()).map(str::to_string),
        },
        "failed" => TaskState::Failed {
            message: text("err_msg").unwrap_or("unknown error").to_string(),
        },
        other => TaskState::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_code_is_remote_error() {
        let err = check_code(&json!({"code": -10002, "msg": "quota exceeded"})).unwrap_err();
        assert!(matches!(err, CollaboratorError::Remote { .. }));
        assert!(err.to_string().contains("quota exceeded"));
        assert!(check_code(&json!({"code": 0, "data": {}})).is_ok());
        assert!(check_code(&json!({"data": {}})).is_err());
    }

    #[test]
    fn parses_every_task_state() {
        let wrap = |data: Value| json!({"code": 0, "data": data});

        assert_eq!(task_state(&wrap(json!({"state": "pending"}))), TaskState::Pending);
        assert_eq!(
            task_state(&wrap(json!({
                "state": "running",
                "extract_progress": {"extracted_pages": 3, "total_pages": 10}
            }))),
            TaskState::Running {
                extracted_pages: 3,
                total_pages: 10
            }
        );
        assert_eq!(task_state(&wrap(json!({"state": "converting"}))), TaskState::Converting);
        assert_eq!(
            task_state(&wrap(json!({"state": "done", "full_zip_url": "https://cdn/x.zip"}))),
            TaskState::Done {
                zip_url: Some("https://cdn/x.zip".into())
            }
        );
        assert_eq!(
            task_state(&wrap(json!({"state": "failed", "err_msg": "bad pdf"}))),
            TaskState::Failed {
                message: "bad pdf".into()
            }
        );
        assert_eq!(
            task_state(&wrap(json!({"state": "queued"}))),
            TaskState::Unknown("queued".into())
        );
    }

    #[test]
    fn done_without_url_has_no_zip() {
        let state = task_state(&json!({"code": 0, "data": {"state": "done", "full_zip_url": ""}}));
        assert_eq!(state, TaskState::Done { zip_url: None });
    }

    #[test]
    fn task_url_appends_id() {
        let config = DeepReadConfig::builder()
            .mineru_api_key("k")
            .mineru_api_url("https://mineru.net/api/v4/extract/task/")
            .build()
            .unwrap();
        let client = MineruClient::new(&config).unwrap();
        assert_eq!(
            client.task_url("abc"),
            "https://mineru.net/api/v4/extract/task/abc"
        );
    }
}
