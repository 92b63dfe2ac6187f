use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use page_harvest::{
    collect, end_session, extract, ElementDescriptor, Error, ExtractionCapability,
    ExtractionMode, ExtractionRequest, PageContent, PageHandle, RemoteSession, Result, Schema,
    Workflow, CLICKABLE_SELECTORS,
};
use tokio::time::Instant;
use serde_json::{json, Value};

/// In-memory page: navigation records the URL, evaluation returns a canned
/// value, and every `close` is counted.
struct FakePage {
    url: Mutex<Option<String>>,
    evaluation: std::result::Result<Value, String>,
    text: String,
    fail_navigation: bool,
    closes: Arc<AtomicUsize>,
}

impl FakePage {
    fn new(evaluation: Value) -> (Self, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let page = Self {
            url: Mutex::new(None),
            evaluation: Ok(evaluation),
            text: "New slots: Starburst, Book of Dead".into(),
            fail_navigation: false,
            closes: Arc::clone(&closes),
        };
        (page, closes)
    }

    fn throwing(message: &str) -> (Self, Arc<AtomicUsize>) {
        let (mut page, closes) = Self::new(Value::Null);
        page.evaluation = Err(message.into());
        (page, closes)
    }

    fn loaded(mut self, url: &str) -> Self {
        self.url = Mutex::new(Some(url.into()));
        self
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        if self.fail_navigation {
            return Err(Error::NavigationError(format!("net::ERR_NAME_NOT_RESOLVED at {url}")));
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn url(&self) -> Result<Option<String>> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        self.evaluation.clone().map_err(Error::EvaluationError)
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }

    async fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic extraction capability.
struct FakeExtractor {
    response: Value,
    delay: Option<Duration>,
    seen: Mutex<Vec<PageContent>>,
}

impl FakeExtractor {
    fn answering(response: Value) -> Self {
        Self {
            response,
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn stalled() -> Self {
        Self {
            response: Value::Null,
            delay: Some(Duration::from_secs(10)),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExtractionCapability for FakeExtractor {
    async fn extract(&self, _request: &ExtractionRequest, content: PageContent) -> Result<Value> {
        self.seen.lock().unwrap().push(content);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

fn two_element_document() -> Value {
    // The in-page script hands back a JSON string.
    Value::String(
        json!([
            { "tagName": "A", "id": "go", "className": null, "text": "Go", "type": null, "href": "/x" },
            { "tagName": "BUTTON", "id": null, "className": "btn", "text": "Click", "type": null, "href": null }
        ])
        .to_string(),
    )
}

fn story_request() -> ExtractionRequest {
    ExtractionRequest::new(
        "Extract the top story.",
        Schema::from_value(&json!({ "story": { "title": "string", "points": "number" } })).unwrap(),
        ExtractionMode::Text,
    )
}

#[tokio::test]
async fn collects_anchor_and_button_with_null_fields() {
    let (page, _) = FakePage::new(two_element_document());
    let page = page.loaded("https://mrq-test.com/");

    let elements = collect(&page, CLICKABLE_SELECTORS).await.unwrap();
    assert_eq!(
        elements,
        vec![
            ElementDescriptor {
                tag_name: "a".into(),
                id: Some("go".into()),
                class_name: None,
                text: Some("Go".into()),
                r#type: None,
                href: Some("https://mrq-test.com/x".into()),
            },
            ElementDescriptor {
                tag_name: "button".into(),
                id: None,
                class_name: Some("btn".into()),
                text: Some("Click".into()),
                r#type: None,
                href: None,
            },
        ]
    );
}

#[tokio::test]
async fn zero_matches_is_an_empty_list() {
    let (page, _) = FakePage::new(Value::String("[]".into()));
    let page = page.loaded("https://mrq-test.com/");
    assert!(collect(&page, CLICKABLE_SELECTORS).await.unwrap().is_empty());
}

#[tokio::test]
async fn collect_on_unloaded_page_is_navigation_error() {
    let (page, _) = FakePage::new(Value::String("[]".into()));
    let err = collect(&page, CLICKABLE_SELECTORS).await.unwrap_err();
    assert!(matches!(err, Error::NavigationError(_)), "got {err}");

    let page = page.loaded("about:blank");
    let err = collect(&page, CLICKABLE_SELECTORS).await.unwrap_err();
    assert!(matches!(err, Error::NavigationError(_)), "got {err}");
}

#[tokio::test]
async fn collect_workflow_persists_and_closes_once() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clickable-elements.json");
    let (page, closes) = FakePage::new(two_element_document());

    let summary = Workflow::new(page, &output)
        .run_collect("https://mrq-test.com/", CLICKABLE_SELECTORS)
        .await
        .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(saved[0]["href"], "https://mrq-test.com/x");
    assert_eq!(saved[1]["type"], Value::Null);
}

#[tokio::test]
async fn script_failure_closes_page_before_returning() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");
    let (page, closes) = FakePage::throwing("ReferenceError: foo is not defined");

    let err = Workflow::new(page, &output)
        .run_collect("https://mrq-test.com/", CLICKABLE_SELECTORS)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EvaluationError(_)), "got {err}");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!output.exists());
}

#[tokio::test]
async fn navigation_failure_closes_page_before_returning() {
    let dir = tempfile::tempdir().unwrap();
    let (mut page, closes) = FakePage::new(Value::Null);
    page.fail_navigation = true;

    let err = Workflow::new(page, dir.path().join("out.json"))
        .run_collect("https://unreachable.invalid/", CLICKABLE_SELECTORS)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NavigationError(_)), "got {err}");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unwritable_output_is_io_write_error_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing-dir").join("out.json");
    let (page, closes) = FakePage::new(Value::String("[]".into()));

    let err = Workflow::new(page, &output)
        .run_collect("https://mrq-test.com/", CLICKABLE_SELECTORS)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::IoWriteError { .. }), "got {err}");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn extraction_result_is_conformed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("extraction.json");
    let (page, closes) = FakePage::new(Value::Null);
    let extractor = FakeExtractor::answering(json!({
        "story": { "title": "Starburst", "points": "12" }
    }));

    let summary = Workflow::new(page, &output)
        .with_extractor(&extractor)
        .run_extract("https://mrq-test.com/", &story_request())
        .await
        .unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(saved, json!({ "story": { "title": "Starburst", "points": 12 } }));

    let seen = extractor.seen.lock().unwrap();
    assert!(matches!(
        &seen[0],
        PageContent::Text { text, .. } if text.contains("Book of Dead")
    ));
}

#[tokio::test]
async fn schema_mismatch_closes_page_before_returning() {
    let dir = tempfile::tempdir().unwrap();
    let (page, closes) = FakePage::new(Value::Null);
    let extractor = FakeExtractor::answering(json!({ "story": { "title": "Starburst" } }));

    let err = Workflow::new(page, dir.path().join("out.json"))
        .with_extractor(&extractor)
        .run_extract("https://mrq-test.com/", &story_request())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SchemaValidationError(_)), "got {err}");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stalled_extraction_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (page, closes) = FakePage::new(Value::Null);
    let extractor = FakeExtractor::stalled();

    let err = Workflow::new(page, dir.path().join("out.json"))
        .with_extractor(&extractor)
        .extraction_timeout(Duration::from_millis(50))
        .run_extract("https://mrq-test.com/", &story_request())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ExtractionTimeout(_)), "got {err}");
    assert_eq!(err.exit_code(), 5);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_extractor_still_closes_page() {
    let dir = tempfile::tempdir().unwrap();
    let (page, closes) = FakePage::new(Value::Null);

    let err = Workflow::new(page, dir.path().join("out.json"))
        .run_extract("https://mrq-test.com/", &story_request())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConfigError(_)), "got {err}");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_instruction_is_rejected() {
    let (page, _) = FakePage::new(Value::Null);
    let page = page.loaded("https://mrq-test.com/");
    let extractor = FakeExtractor::answering(json!({}));
    let mut request = story_request();
    request.instruction = "   ".into();

    let err = extract(&page, &extractor, &request, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "got {err}");
    assert!(extractor.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn vision_mode_sends_a_screenshot() {
    let (page, _) = FakePage::new(Value::Null);
    let page = page.loaded("https://mrq-test.com/");
    let extractor = FakeExtractor::answering(json!(["Starburst"]));
    let request = ExtractionRequest::new(
        "Extract the names of the new online slots.",
        Schema::array(Schema::String),
        ExtractionMode::Vision,
    );

    let data = extract(&page, &extractor, &request, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(data, json!(["Starburst"]));

    let seen = extractor.seen.lock().unwrap();
    assert!(matches!(&seen[0], PageContent::Screenshot { png, .. } if png.starts_with(&[0x89])));
}

fn remote_session() -> RemoteSession {
    RemoteSession {
        recording_url: "https://browserbase.com/sessions/sess-42".into(),
        settle_delay: Duration::from_secs(10),
    }
}

#[tokio::test(start_paused = true)]
async fn recording_wait_starts_after_the_browser_is_released() {
    let closed_at = Mutex::new(None);
    let session = remote_session();

    end_session(
        async {
            *closed_at.lock().unwrap() = Some(Instant::now());
            Ok(())
        },
        Some(&session),
    )
    .await;

    let closed_at = (*closed_at.lock().unwrap()).expect("browser was not closed");
    assert!(closed_at.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn failed_release_still_waits_for_the_recording() {
    let start = Instant::now();
    let session = remote_session();

    end_session(
        async { Err(Error::LaunchError("browser already gone".into())) },
        Some(&session),
    )
    .await;

    assert!(start.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn local_session_ends_without_waiting() {
    let start = Instant::now();
    end_session(async { Ok(()) }, None).await;
    assert!(start.elapsed() < Duration::from_secs(1));
}
