//! Object storage: publish a local file at a URL the parser can fetch.
//!
//! [`GiteeStore`] commits the file into a Gitee repository through the v5
//! contents API and hands back its raw download URL. The remote name is the
//! SHA-256 of the content, so uploading the same bytes twice reuses the
//! first commit instead of failing on a name clash.

use super::{error_body, http_client, with_retries, RetryPolicy};
use crate::config::DeepReadConfig;
use crate::error::{CollaboratorError, DeepReadError};
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

const SERVICE: &str = "gitee";
pub const GITEE_API_BASE: &str = "https://gitee.com/api/v5";

/// A file published by an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Direct (raw) URL of the file content.
    pub download_url: String,
    /// Human-facing page for the file, when the store has one.
    pub page_url: Option<String>,
    /// Path of the file inside the store.
    pub remote_path: String,
    /// True when an identical file was already present and nothing was written.
    pub reused: bool,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Publish the file at `path` and return where it can be fetched.
    async fn upload(&self, path: &Path) -> Result<StoredObject, CollaboratorError>;
}

/// Gitee repository used as a public file host.
#[derive(Debug, Clone)]
pub struct GiteeStore {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
    owner: String,
    repo: String,
    branch: String,
    upload_path: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl GiteeStore {
    pub fn new(config: &DeepReadConfig) -> Result<Self, DeepReadError> {
        let gitee = &config.gitee;
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| DeepReadError::InvalidConfig(format!("{name} is not set")))
        };
        let client = http_client(SERVICE, config.request_timeout_secs)
            .map_err(|e| DeepReadError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_base: GITEE_API_BASE.to_string(),
            access_token: require(&gitee.access_token, "GITEE_ACCESS_TOKEN")?,
            owner: require(&gitee.owner, "GITEE_OWNER")?,
            repo: require(&gitee.repo, "GITEE_REPO")?.to_lowercase(),
            branch: gitee.branch.clone(),
            upload_path: gitee.upload_path.clone(),
            timeout_secs: config.request_timeout_secs,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        })
    }

    /// Point the store at a different API root (self-hosted Gitee, test server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, remote_path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, remote_path
        )
    }

    fn raw_url(&self, remote_path: &str) -> String {
        format!(
            "https://gitee.com/{}/{}/raw/{}/{}",
            self.owner, self.repo, self.branch, remote_path
        )
    }

    /// Look for a file already stored at `remote_path`.
    async fn find_existing(
        &self,
        remote_path: &str,
    ) -> Result<Option<StoredObject>, CollaboratorError> {
        let response = self
            .client
            .get(self.contents_url(remote_path))
            .query(&[("access_token", self.access_token.as_str()), ("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(CollaboratorError::from_status(SERVICE, status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;

        Ok(existing_entry(&body, remote_path)
            .map(|entry| stored_object(entry, remote_path, self.raw_url(remote_path), true)))
    }

    async fn create(
        &self,
        remote_path: &str,
        encoded: &str,
        message: &str,
    ) -> Result<StoredObject, CollaboratorError> {
        let payload = json!({
            "access_token": self.access_token,
            "content": encoded,
            "message": message,
            "branch": self.branch,
        });

        let response = self
            .client
            .post(self.contents_url(remote_path))
            .json(&payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;
            let entry = body.get("content").unwrap_or(&Value::Null);
            return Ok(stored_object(entry, remote_path, self.raw_url(remote_path), false));
        }

        let body = error_body(response).await;
        // Another run committed the same content between our lookup and create.
        if status == reqwest::StatusCode::BAD_REQUEST
            && body.to_lowercase().contains("already exists")
        {
            debug!("Gitee reports {} already exists; reusing it", remote_path);
            return Ok(StoredObject {
                download_url: self.raw_url(remote_path),
                page_url: None,
                remote_path: remote_path.to_string(),
                reused: true,
            });
        }
        Err(CollaboratorError::from_status(SERVICE, status, body))
    }
}

#[async_trait]
impl ObjectStore for GiteeStore {
    async fn upload(&self, path: &Path) -> Result<StoredObject, CollaboratorError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CollaboratorError::io(path, e))?;

        let digest = hex::encode(Sha256::digest(&bytes));
        let month = chrono::Local::now().format("%Y/%m").to_string();
        let remote_path = remote_path_for(&self.upload_path, &month, &digest, path);

        info!(
            "Uploading {} ({} bytes) to gitee:{}/{}",
            path.display(),
            bytes.len(),
            self.repo,
            remote_path
        );

        if let Some(existing) =
            with_retries(SERVICE, self.retry, || self.find_existing(&remote_path)).await?
        {
            info!("Content already stored at {}; skipping upload", remote_path);
            return Ok(existing);
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| digest.clone());
        let message = format!("Upload PDF: {filename}");

        let stored = with_retries(SERVICE, self.retry, || {
            self.create(&remote_path, &encoded, &message)
        })
        .await?;
        info!("Uploaded to {}", stored.download_url);
        Ok(stored)
    }
}

/// `<upload_path>/<YYYY>/<MM>/<sha256><ext>` with no leading or doubled slashes.
pub fn remote_path_for(upload_path: &str, month: &str, digest: &str, source: &Path) -> String {
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let dir = upload_path.trim_matches('/');
    if dir.is_empty() {
        format!("{month}/{digest}{ext}")
    } else {
        format!("{dir}/{month}/{digest}{ext}")
    }
}

/// Pick the entry describing `remote_path` from a contents-API GET response.
///
/// Gitee answers with a single object for an existing file and with a list
/// (empty when nothing matches) otherwise.
fn existing_entry<'a>(body: &'a Value, remote_path: &str) -> Option<&'a Value> {
    match body {
        Value::Object(map) if map.contains_key("download_url") || map.contains_key("sha") => {
            Some(body)
        }
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("path").and_then(Value::as_str) == Some(remote_path)),
        _ => None,
    }
}

fn stored_object(
    entry: &Value,
    remote_path: &str,
    fallback_url: String,
    reused: bool,
) -> StoredObject {
    let text = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    StoredObject {
        download_url: text("download_url").unwrap_or(fallback_url),
        page_url: text("html_url"),
        remote_path: remote_path.to_string(),
        reused,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GiteeStore {
        let config = DeepReadConfig::builder()
            .gitee_access_token("token")
            .gitee_owner("alice")
            .gitee_repo("My-Docs")
            .build()
            .unwrap();
        GiteeStore::new(&config).unwrap()
    }

    #[test]
    fn remote_path_trims_slashes() {
        let src = Path::new("/tmp/Report.PDF");
        assert_eq!(remote_path_for("pdfs/", "2024/05", "abc", src), "pdfs/2024/05/abc.PDF");
        assert_eq!(remote_path_for("/a/b/", "2024/05", "abc", src), "a/b/2024/05/abc.PDF");
        assert_eq!(remote_path_for("", "2024/05", "abc", src), "2024/05/abc.PDF");
        assert_eq!(remote_path_for("x", "2024/05", "abc", Path::new("noext")), "x/2024/05/abc");
    }

    #[test]
    fn repo_name_is_lowercased() {
        let s = store();
        assert_eq!(
            s.raw_url("pdfs/a.pdf"),
            "https://gitee.com/alice/my-docs/raw/master/pdfs/a.pdf"
        );
        assert_eq!(
            s.contents_url("pdfs/a.pdf"),
            "https://gitee.com/api/v5/repos/alice/my-docs/contents/pdfs/a.pdf"
        );
    }

    #[test]
    fn missing_credentials_fail_construction() {
        let err = GiteeStore::new(&DeepReadConfig::default()).unwrap_err();
        assert!(err.to_string().contains("GITEE_ACCESS_TOKEN"));
    }

    #[test]
    fn existing_entry_handles_object_and_list() {
        let object = json!({"type": "file", "sha": "1", "download_url": "https://raw/x"});
        assert!(existing_entry(&object, "p/x.pdf").is_some());

        let empty = json!([]);
        assert!(existing_entry(&empty, "p/x.pdf").is_none());

        let list = json!([{"path": "p/y.pdf"}, {"path": "p/x.pdf", "download_url": "u"}]);
        let hit = existing_entry(&list, "p/x.pdf").unwrap();
        assert_eq!(hit["download_url"], "u");
    }

    #[test]
    fn stored_object_falls_back_to_raw_url() {
        let entry = json!({"html_url": "https://gitee.com/page"});
        let s = stored_object(&entry, "p/x.pdf", "https://fallback".into(), false);
        assert_eq!(s.download_url, "https://fallback");
        assert_eq!(s.page_url.as_deref(), Some("https://gitee.com/page"));
        assert!(!s.reused);

        let s = stored_object(&Value::Null, "p/x.pdf", "https://fallback".into(), true);
        assert_eq!(s.download_url, "https://fallback");
        assert_eq!(s.page_url, None);
    }
}
