//! End-to-end runs of the built-in flows with in-process collaborators.
//!
//! Nothing here touches the network: storage, parser, PDF extraction and the
//! language model are replaced through the factory's `with_*` overrides.

use async_trait::async_trait;
use deepread::services::{
    DocumentParser, ObjectStore, ParsedDocument, PdfTextExtractor, StoredObject, Summarizer,
    Summary, SummaryRequest,
};
use deepread::{
    keys, process, process_batch, CollaboratorError, Context, ContextValue, DeepReadConfig,
    DeepReadError, PipelineFactory, PipelineProgressCallback, ProcessRequest, StepMode,
    SummaryStyle,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeStore {
    uploads: AtomicUsize,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn upload(&self, path: &Path) -> Result<StoredObject, CollaboratorError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let file = path.file_name().unwrap().to_string_lossy().to_string();
        Ok(StoredObject {
            download_url: format!("https://files.test/raw/{n}/{file}"),
            page_url: Some(format!("https://files.test/blob/{n}/{file}")),
            remote_path: format!("pdfs/{n}/{file}"),
            reused: false,
        })
    }
}

enum ParserBehaviour {
    Inline(&'static str),
    TimesOut,
}

struct FakeParser {
    behaviour: ParserBehaviour,
    calls: AtomicUsize,
}

impl FakeParser {
    fn new(behaviour: ParserBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn parse(&self, _url: &str) -> Result<ParsedDocument, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            ParserBehaviour::Inline(markdown) => Ok(ParsedDocument::Inline {
                markdown: markdown.to_string(),
            }),
            ParserBehaviour::TimesOut => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(CollaboratorError::Timeout {
                    service: "mineru".to_string(),
                    secs: 1,
                })
            }
        }
    }
}

struct FakePdf;

#[async_trait]
impl PdfTextExtractor for FakePdf {
    async fn extract_pages(&self, _path: &Path) -> Result<Vec<String>, CollaboratorError> {
        Ok(vec!["First page text.".into(), "Second page text.".into()])
    }
}

#[derive(Default)]
struct FakeSummarizer {
    requests: Mutex<Vec<SummaryRequest>>,
}

impl FakeSummarizer {
    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.system_prompt.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<Summary, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(Summary {
            text: "```markdown\n# Summary\n\nA short summary.   \n```".to_string(),
            input_tokens: 120,
            output_tokens: 8,
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for RecordingProgress {
    fn on_step_start(&self, index: usize, _total: usize, step: &str) {
        self.events.lock().unwrap().push(format!("start {index} {step}"));
    }

    fn on_step_complete(&self, index: usize, _total: usize, step: &str, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done {index} {step}"));
    }

    fn on_step_error(&self, index: usize, _total: usize, step: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("error {index} {step}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    dir: tempfile::TempDir,
    store: Arc<FakeStore>,
    parser: Arc<FakeParser>,
    summarizer: Arc<FakeSummarizer>,
}

impl Harness {
    fn new(behaviour: ParserBehaviour) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            store: Arc::new(FakeStore::default()),
            parser: FakeParser::new(behaviour),
            summarizer: Arc::new(FakeSummarizer::default()),
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn factory(&self) -> PipelineFactory {
        let config = DeepReadConfig::builder()
            .output_dir(self.output_dir())
            .prompts_dir(self.dir.path().join("prompts"))
            .build()
            .unwrap();
        PipelineFactory::new(config)
            .with_storage(self.store.clone())
            .with_parser(self.parser.clone())
            .with_pdf_extractor(Arc::new(FakePdf))
            .with_summarizer(self.summarizer.clone())
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn files_named(&self, name: &str) -> Vec<PathBuf> {
        fn walk(dir: &Path, name: &str, found: &mut Vec<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, name, found);
                } else if path.file_name().is_some_and(|n| n == name) {
                    found.push(path);
                }
            }
        }
        let mut found = Vec::new();
        walk(self.dir.path(), name, &mut found);
        found
    }
}

fn path_value(ctx: &Context, key: &str) -> PathBuf {
    match ctx.get(key) {
        Some(ContextValue::Path(p)) => p.clone(),
        other => panic!("expected a path under '{key}', got {other:?}"),
    }
}

fn text_value<'a>(ctx: &'a Context, key: &str) -> &'a str {
    ctx.get(key)
        .and_then(|v| v.as_text())
        .unwrap_or_else(|| panic!("expected text under '{key}'"))
}

// ── Flows ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_flow_fills_context_and_writes_summary() {
    let h = Harness::new(ParserBehaviour::Inline("# Paper\n\nBody text.\n"));
    let pdf = h.write("paper.pdf", "%PDF-1.4 fake");

    let output = process(&h.factory(), &ProcessRequest::new(&pdf)).await.unwrap();
    let ctx = &output.context;

    for key in [
        keys::PDF_PATH,
        keys::ORIGINAL_FILENAME,
        keys::REMOTE_URL,
        keys::REMOTE_PAGE_URL,
        keys::MARKDOWN_PATH,
        keys::MARKDOWN_CONTENT,
        keys::MARKDOWN_LENGTH,
        keys::EXTRACT_DIR,
        keys::SUMMARY_TEXT,
        keys::SUMMARY_LENGTH,
        keys::SUMMARY_INPUT_TOKENS,
        keys::SUMMARY_OUTPUT_TOKENS,
        keys::OUTPUT_PATH,
    ] {
        assert!(ctx.contains(key), "missing key {key}");
    }

    assert_eq!(text_value(ctx, keys::ORIGINAL_FILENAME), "paper");
    assert_eq!(text_value(ctx, keys::REMOTE_URL), "https://files.test/raw/1/paper.pdf");
    assert_eq!(text_value(ctx, keys::MARKDOWN_CONTENT), "# Paper\n\nBody text.\n");

    // The summary lands next to the parsed Markdown, fence stripped.
    let saved = path_value(ctx, keys::OUTPUT_PATH);
    assert_eq!(saved.parent(), path_value(ctx, keys::MARKDOWN_PATH).parent());
    assert!(saved.starts_with(h.output_dir()));
    let written = std::fs::read_to_string(&saved).unwrap();
    assert_eq!(written, "# Summary\n\nA short summary.\n");
    assert_eq!(text_value(ctx, keys::SUMMARY_TEXT), written);

    let steps: Vec<_> = output.stats.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(steps, vec!["Upload", "Parse", "Summarize", "Save"]);
    assert_eq!(output.stats.pipeline, "full");
}

#[tokio::test]
async fn missing_pdf_path_stops_at_upload() {
    let h = Harness::new(ParserBehaviour::Inline("# Paper\n"));
    let pipeline = h.factory().full().unwrap();

    let err = pipeline.run(Context::new()).await.unwrap_err();

    assert_eq!(err.step_name, "Upload");
    assert_eq!(err.step_index, 1);
    assert_eq!(err.total_steps, 4);
    assert_eq!(err.source.missing_input().map(|m| m.key.as_str()), Some(keys::PDF_PATH));
    assert!(err.to_string().contains("pdf_path"));

    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.summarizer.calls(), 0);
    assert!(err.context.is_empty());
}

#[tokio::test]
async fn parser_timeout_aborts_before_summary() {
    let h = Harness::new(ParserBehaviour::TimesOut);
    let pdf = h.write("slow.pdf", "%PDF-1.4 fake");
    let progress = Arc::new(RecordingProgress::default());
    let factory = h.factory().progress_callback(progress.clone());

    let err = process(&factory, &ProcessRequest::new(&pdf)).await.unwrap_err();
    let DeepReadError::Aborted(abort) = err else {
        panic!("expected an aborted run, got {err:?}");
    };

    assert_eq!(abort.step_name, "Parse");
    assert!(abort.source.is_timeout());
    assert!(abort.to_string().contains("timeout"));

    // Upload's output survives in the abort snapshot, nothing later does.
    assert!(abort.context.contains(keys::REMOTE_URL));
    assert!(!abort.context.contains(keys::MARKDOWN_CONTENT));
    assert!(!abort.context.contains(keys::SUMMARY_TEXT));

    assert_eq!(h.summarizer.calls(), 0);
    assert!(h.files_named("summary.md").is_empty());
    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["start 1 Upload", "done 1 Upload", "start 2 Parse", "error 2 Parse"]
    );
}

#[tokio::test]
async fn rerunning_repeats_side_effects() {
    let h = Harness::new(ParserBehaviour::Inline("# Paper\n"));
    let pdf = h.write("paper.pdf", "%PDF-1.4 fake");
    let pipeline = h.factory().parse_only().unwrap();

    for _ in 0..2 {
        let ctx = Context::new().with(keys::PDF_PATH, pdf.clone());
        pipeline.run(ctx).await.unwrap();
    }

    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 2);
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.summarizer.calls(), 0);
}

#[tokio::test]
async fn local_flow_never_uploads() {
    let h = Harness::new(ParserBehaviour::Inline("unused"));
    let pdf = h.write("report.pdf", "%PDF-1.4 fake");
    let target = h.dir.path().join("report_summary.md");

    let request = ProcessRequest::new(&pdf).local(true).output_path(&target);
    let output = process(&h.factory(), &request).await.unwrap();

    let markdown = text_value(&output.context, keys::MARKDOWN_CONTENT);
    assert!(markdown.contains("<!-- page 1 -->"));
    assert!(markdown.contains("Second page text."));
    assert_eq!(path_value(&output.context, keys::OUTPUT_PATH), target);
    assert!(target.is_file());
    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summary_only_flow_uses_style_and_custom_prompt() {
    let h = Harness::new(ParserBehaviour::Inline("unused"));
    let md = h.write("notes.md", "# Notes\n\nSome notes.\n");
    let factory = h.factory();

    let output = process(
        &factory,
        &ProcessRequest::new(&md).style(SummaryStyle::Bullet),
    )
    .await
    .unwrap();
    assert_eq!(output.stats.pipeline, "summary-only");
    assert_eq!(
        path_value(&output.context, keys::OUTPUT_PATH),
        h.dir.path().join("notes_summary.md")
    );
    assert_eq!(h.summarizer.last_prompt(), SummaryStyle::Bullet.builtin_prompt());

    let request = ProcessRequest::new(&md)
        .step(StepMode::Summarize)
        .custom_prompt("Only list the headings.");
    process(&factory, &request).await.unwrap();
    assert_eq!(h.summarizer.last_prompt(), "Only list the headings.");
    assert_eq!(h.store.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn prompt_file_overrides_builtin_style() {
    let h = Harness::new(ParserBehaviour::Inline("unused"));
    std::fs::create_dir_all(h.dir.path().join("prompts")).unwrap();
    h.write("prompts/concise.md", "Two sentences, no more.");
    let md = h.write("notes.md", "# Notes\n");

    let request = ProcessRequest::new(&md).style(SummaryStyle::Concise);
    process(&h.factory(), &request).await.unwrap();

    assert_eq!(h.summarizer.last_prompt(), "Two sentences, no more.");
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let h = Harness::new(ParserBehaviour::Inline("unused"));
    let mut requests = Vec::new();
    for i in 0..3 {
        std::fs::create_dir_all(h.dir.path().join(format!("doc{i}"))).unwrap();
        let md = h.write(&format!("doc{i}/notes.md"), &format!("# Document {i}\n"));
        requests.push(ProcessRequest::new(md));
    }
    requests.insert(1, ProcessRequest::new(h.dir.path().join("missing.md")));

    let results = process_batch(&h.factory(), &requests, 2).await;

    assert_eq!(results.len(), 4);
    assert!(matches!(results[1], Err(DeepReadError::InvalidInput { .. })));
    for (request, result) in requests.iter().zip(&results) {
        if let Ok(output) = result {
            let expected = request.input.parent().unwrap().join("notes_summary.md");
            assert_eq!(path_value(&output.context, keys::OUTPUT_PATH), expected);
            assert_eq!(
                text_value(&output.context, keys::MARKDOWN_CONTENT),
                std::fs::read_to_string(&request.input).unwrap()
            );
        }
    }
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(h.summarizer.calls(), 3);
}

#[tokio::test]
async fn batch_from_one_directory_writes_one_summary_per_document() {
    let h = Harness::new(ParserBehaviour::Inline("unused"));
    let a = h.write("a.md", "# A\n");
    let b = h.write("b.md", "# B\n");
    let requests = vec![ProcessRequest::new(&a), ProcessRequest::new(&b)];

    let results = process_batch(&h.factory(), &requests, 2).await;

    let saved: Vec<PathBuf> = results
        .iter()
        .map(|r| path_value(&r.as_ref().unwrap().context, keys::OUTPUT_PATH))
        .collect();
    assert_eq!(
        saved,
        vec![h.dir.path().join("a_summary.md"), h.dir.path().join("b_summary.md")]
    );
    for path in &saved {
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Summary\n\nA short summary.\n");
    }
    assert_eq!(h.summarizer.calls(), 2);

    let mut leftovers: Vec<String> = std::fs::read_dir(h.dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    leftovers.sort();
    assert_eq!(leftovers, vec!["a.md", "a_summary.md", "b.md", "b_summary.md"]);
}

#[tokio::test]
async fn remote_flow_without_credentials_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("paper.pdf");
    std::fs::write(&pdf, "%PDF-1.4 fake").unwrap();
    let factory = PipelineFactory::new(DeepReadConfig::default())
        .with_summarizer(Arc::new(FakeSummarizer::default()));

    let err = process(&factory, &ProcessRequest::new(&pdf)).await.unwrap_err();

    assert!(matches!(err, DeepReadError::InvalidConfig(_)));
    assert!(err.to_string().contains("GITEE_ACCESS_TOKEN"));
}
