use crate::context::{keys, Context};
use crate::error::StepError;
use crate::pipeline::Step;
use crate::services::Persistence;
use crate::steps::document_name;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// File name used when the summary sits in a parse output directory.
pub const SUMMARY_FILE: &str = "summary.md";

/// Write `summary_text` to disk.
pub struct SaveStep {
    persistence: Arc<dyn Persistence>,
    output_dir: PathBuf,
}

impl SaveStep {
    pub const NAME: &'static str = "Save";

    pub fn new(persistence: Arc<dyn Persistence>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence,
            output_dir: output_dir.into(),
        }
    }

    /// Destination, first match wins:
    ///
    /// 1. `output_path`
    /// 2. `<extract_dir>/summary.md` when the Markdown came out of a parse step
    /// 3. `<stem>_summary.md` next to a standalone `markdown_path`
    /// 4. `<output_dir>/<original_filename>_summary.md`
    /// 5. `<output_dir>/summary.md`
    ///
    /// Standalone inputs get their own file name so several documents from
    /// one directory never share a destination.
    fn destination(&self, ctx: &Context) -> Result<PathBuf, StepError> {
        if let Some(path) = ctx.optional_path(Self::NAME, keys::OUTPUT_PATH)? {
            return Ok(path);
        }
        if let Some(dir) = ctx.optional_path(Self::NAME, keys::EXTRACT_DIR)? {
            return Ok(dir.join(SUMMARY_FILE));
        }
        if let Some(md) = ctx.optional_path(Self::NAME, keys::MARKDOWN_PATH)? {
            if let Some(parent) = md.parent() {
                return Ok(parent.join(format!("{}_summary.md", document_name(&md))));
            }
        }
        if let Some(name) = ctx.optional_text(Self::NAME, keys::ORIGINAL_FILENAME)? {
            return Ok(self.output_dir.join(format!("{name}_summary.md")));
        }
        Ok(self.output_dir.join(SUMMARY_FILE))
    }
}

#[async_trait]
impl Step for SaveStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires(&self) -> &'static [&'static str] {
        &[keys::SUMMARY_TEXT]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[keys::OUTPUT_PATH]
    }

    async fn execute(&self, ctx: &mut Context) -> Result<(), StepError> {
        let text = ctx.require_text(Self::NAME, keys::SUMMARY_TEXT)?;
        let path = self.destination(ctx)?;

        self.persistence.write_text(&path, text).await?;
        info!("Summary saved to {}", path.display());

        ctx.insert(keys::OUTPUT_PATH, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FsPersistence;
    use std::path::Path;

    fn step() -> SaveStep {
        SaveStep::new(Arc::new(FsPersistence), "out")
    }

    fn ctx() -> Context {
        Context::new().with(keys::SUMMARY_TEXT, "# Summary\n")
    }

    #[test]
    fn explicit_output_path_wins() {
        let c = ctx()
            .with(keys::OUTPUT_PATH, "/tmp/x.md")
            .with(keys::MARKDOWN_PATH, PathBuf::from("/data/run/full.md"));
        assert_eq!(step().destination(&c).unwrap(), Path::new("/tmp/x.md"));
    }

    #[test]
    fn parse_output_gets_summary_in_extract_dir() {
        let c = ctx()
            .with(keys::MARKDOWN_PATH, PathBuf::from("/data/run/full.md"))
            .with(keys::EXTRACT_DIR, PathBuf::from("/data/run"))
            .with(keys::ORIGINAL_FILENAME, "paper");
        assert_eq!(step().destination(&c).unwrap(), Path::new("/data/run/summary.md"));
    }

    #[test]
    fn standalone_markdown_is_named_after_its_stem() {
        let a = ctx().with(keys::MARKDOWN_PATH, PathBuf::from("/notes/a.md"));
        let b = ctx().with(keys::MARKDOWN_PATH, PathBuf::from("/notes/b.md"));
        assert_eq!(step().destination(&a).unwrap(), Path::new("/notes/a_summary.md"));
        assert_eq!(step().destination(&b).unwrap(), Path::new("/notes/b_summary.md"));
    }

    #[test]
    fn falls_back_to_output_dir() {
        let c = ctx().with(keys::ORIGINAL_FILENAME, "paper");
        assert_eq!(step().destination(&c).unwrap(), Path::new("out/paper_summary.md"));
        assert_eq!(step().destination(&ctx()).unwrap(), Path::new("out/summary.md"));
    }

    #[tokio::test]
    async fn writes_file_and_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("s.md");
        let mut c = ctx().with(keys::OUTPUT_PATH, target.clone());

        step().execute(&mut c).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Summary\n");
        assert_eq!(c.get(keys::OUTPUT_PATH), Some(&target.into()));
    }
}
