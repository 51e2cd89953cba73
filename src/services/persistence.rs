//! Durable output writes.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Write `text` to `path`, creating parent directories as needed.
    async fn write_text(&self, path: &Path, text: &str) -> Result<(), CollaboratorError>;
}

/// Local filesystem writer.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never sees a half-written file. Each write gets its own temporary
/// name, so concurrent writers never clobber each other's partial output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPersistence;

#[async_trait]
impl Persistence for FsPersistence {
    async fn write_text(&self, path: &Path, text: &str) -> Result<(), CollaboratorError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CollaboratorError::io(parent, e))?;
        }

        let tmp_path = temp_sibling(path);
        tokio::fs::write(&tmp_path, text)
            .await
            .map_err(|e| CollaboratorError::io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CollaboratorError::io(path, e));
        }
        Ok(())
    }
}

/// `.<name>.<pid>-<n>.tmp` next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}-{n}.tmp", std::process::id()))
}
