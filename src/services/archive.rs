//! Fetch a parser's result archive and unpack it.
//!
//! The archive is streamed to a temporary file first so large results never
//! sit in memory, then extracted on a blocking thread. Top-level `.json` and
//! `.pdf` files (layout dumps and the echoed source) are removed afterwards;
//! the Markdown and its image assets stay.

use super::{error_body, http_client, with_retries, RetryPolicy};
use crate::config::DeepReadConfig;
use crate::error::{CollaboratorError, DeepReadError};
use async_trait::async_trait;
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use zip::ZipArchive;

const SERVICE: &str = "archive";

/// Name of the combined Markdown file inside a MinerU archive.
pub const PRIMARY_MARKDOWN: &str = "full.md";

/// Where an archive was unpacked and which file holds the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    pub dir: PathBuf,
    pub primary: PathBuf,
}

#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Download the archive at `url` and unpack it into `dest`.
    async fn fetch_and_extract(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<ExtractedArchive, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct ZipArchiveExtractor {
    client: reqwest::Client,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl ZipArchiveExtractor {
    pub fn new(config: &DeepReadConfig) -> Result<Self, DeepReadError> {
        let client = http_client(SERVICE, config.request_timeout_secs)
            .map_err(|e| DeepReadError::Internal(e.to_string()))?;
        Ok(Self {
            client,
            timeout_secs: config.request_timeout_secs,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        })
    }

    /// Stream `url` into `target`, replacing anything written by an earlier attempt.
    async fn download(&self, url: &str, target: &Path) -> Result<u64, CollaboratorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(CollaboratorError::from_status(SERVICE, status, body));
        }

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| CollaboratorError::io(target, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| CollaboratorError::from_reqwest(SERVICE, e, self.timeout_secs))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CollaboratorError::io(target, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| CollaboratorError::io(target, e))?;
        Ok(written)
    }
}

#[async_trait]
impl ArchiveExtractor for ZipArchiveExtractor {
    async fn fetch_and_extract(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<ExtractedArchive, CollaboratorError> {
        let scratch =
            tempfile::tempdir().map_err(|e| CollaboratorError::io(std::env::temp_dir(), e))?;
        let zip_path = scratch.path().join("result.zip");

        info!("Downloading archive {}", url);
        let bytes = with_retries(SERVICE, self.retry, || self.download(url, &zip_path)).await?;
        debug!("Archive downloaded: {} bytes", bytes);

        let dest = dest.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_zip(&zip_path, &dest))
            .await
            .map_err(|e| CollaboratorError::CorruptArchive {
                path: PathBuf::from(url),
                detail: format!("extraction task failed: {e}"),
            })??;

        info!("Extracted archive to {}", extracted.dir.display());
        Ok(extracted)
    }
}

/// Unpack `zip_path` into `dest`, prune top-level `.json`/`.pdf` files and
/// locate the primary Markdown file.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<ExtractedArchive, CollaboratorError> {
    let corrupt = |detail: String| CollaboratorError::CorruptArchive {
        path: zip_path.to_path_buf(),
        detail,
    };

    let file = fs::File::open(zip_path).map_err(|e| CollaboratorError::io(zip_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    fs::create_dir_all(dest).map_err(|e| CollaboratorError::io(dest, e))?;
    archive.extract(dest).map_err(|e| corrupt(e.to_string()))?;

    prune_top_level(dest)?;

    let primary = find_primary_markdown(dest)?
        .ok_or_else(|| corrupt("archive contains no Markdown file".to_string()))?;

    Ok(ExtractedArchive {
        dir: dest.to_path_buf(),
        primary,
    })
}

fn prune_top_level(dir: &Path) -> Result<(), CollaboratorError> {
    let entries = fs::read_dir(dir).map_err(|e| CollaboratorError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| CollaboratorError::io(dir, e))?.path();
        if path.is_file() && has_extension(&path, &["json", "pdf"]) {
            debug!("Removing {}", path.display());
            fs::remove_file(&path).map_err(|e| CollaboratorError::io(&path, e))?;
        }
    }
    Ok(())
}

/// `full.md` at the top level, otherwise the first `.md` in path order.
fn find_primary_markdown(dir: &Path) -> Result<Option<PathBuf>, CollaboratorError> {
    let full = dir.join(PRIMARY_MARKDOWN);
    if full.is_file() {
        return Ok(Some(full));
    }

    let mut pending = vec![dir.to_path_buf()];
    let mut found = Vec::new();
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).map_err(|e| CollaboratorError::io(&current, e))? {
            let path = entry.map_err(|e| CollaboratorError::io(&current, e))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_extension(&path, &["md"]) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| wanted.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_and_prunes_mineru_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("r.zip");
        write_zip(
            &zip_path,
            &[
                ("full.md", "# Paper\n\nBody"),
                ("layout.json", "{}"),
                ("origin.pdf", "%PDF-1.7"),
                ("images/fig1.jpg", "jpeg"),
            ],
        );

        let dest = tmp.path().join("out");
        let extracted = extract_zip(&zip_path, &dest).unwrap();

        assert_eq!(extracted.dir, dest);
        assert_eq!(extracted.primary, dest.join("full.md"));
        assert!(!dest.join("layout.json").exists());
        assert!(!dest.join("origin.pdf").exists());
        assert!(dest.join("images/fig1.jpg").exists());
    }

    #[test]
    fn falls_back_to_first_markdown() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("r.zip");
        write_zip(&zip_path, &[("b.md", "b"), ("a.md", "a")]);

        let extracted = extract_zip(&zip_path, &tmp.path().join("out")).unwrap();
        assert_eq!(extracted.primary.file_name().unwrap(), "a.md");
    }

    #[test]
    fn archive_without_markdown_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("r.zip");
        write_zip(&zip_path, &[("layout.json", "{}")]);

        let err = extract_zip(&zip_path, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, CollaboratorError::CorruptArchive { .. }));
    }

    #[test]
    fn garbage_bytes_are_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("r.zip");
        fs::write(&zip_path, b"definitely not a zip").unwrap();

        let err = extract_zip(&zip_path, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, CollaboratorError::CorruptArchive { .. }), "got {err:?}");
    }
}
