//! The end-to-end run: navigate, collect or extract, release the page,
//! persist, report.
//!
//! A [`Workflow`] owns the page handle for the duration of one run and closes
//! it exactly once, whether the run succeeds or fails. Errors are returned,
//! never turned into a process exit, so the binary decides the exit status.
//! Once the browser session itself is released, [`end_session`] waits for a
//! remote session's recording and points at it.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::collector::{self, ElementDescriptor};
use crate::error::{Error, Result};
use crate::extractor::{self, ExtractionCapability, ExtractionRequest};
use crate::page::PageHandle;
use crate::sink;

pub const DEFAULT_COLLECT_OUTPUT: &str = "clickable-elements.json";
pub const DEFAULT_EXTRACT_OUTPUT: &str = "extraction.json";
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// A remote browser session whose recording becomes viewable shortly after
/// the run ends.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub recording_url: String,
    pub settle_delay: Duration,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub records: usize,
}

pub struct Workflow<'a, P: PageHandle> {
    page: P,
    extractor: Option<&'a dyn ExtractionCapability>,
    output: PathBuf,
    extraction_timeout: Duration,
}

impl<'a, P: PageHandle> Workflow<'a, P> {
    pub fn new(page: P, output: impl Into<PathBuf>) -> Self {
        Self {
            page,
            extractor: None,
            output: output.into(),
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    pub fn with_extractor(mut self, extractor: &'a dyn ExtractionCapability) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    /// Load `url` and save its clickable elements.
    pub async fn run_collect(self, url: &str, selectors: &[&str]) -> Result<RunSummary> {
        let Workflow { page, output, .. } = self;

        let collected: Result<Vec<ElementDescriptor>> = async {
            page.goto(url).await?;
            collector::collect(&page, selectors).await
        }
        .await;
        release(page, collected.is_ok()).await;
        let elements = collected?;

        sink::persist(&elements, &output)?;
        sink::report_elements(&elements);
        sink::announce(&format!("Clickable elements saved to {}", output.display()));

        Ok(RunSummary {
            output,
            records: elements.len(),
        })
    }

    /// Load `url`, run a structured extraction and save the result.
    pub async fn run_extract(self, url: &str, request: &ExtractionRequest) -> Result<RunSummary> {
        let Workflow {
            page,
            extractor: capability,
            output,
            extraction_timeout,
        } = self;

        let extracted: Result<Value> = async {
            let capability = capability.ok_or_else(|| {
                Error::ConfigError("no extraction capability configured".into())
            })?;
            page.goto(url).await?;
            extractor::extract(&page, capability, request, extraction_timeout).await
        }
        .await;
        release(page, extracted.is_ok()).await;
        let data = extracted?;

        sink::persist(&data, &output)?;
        sink::report("Extraction result", &data);
        sink::announce(&format!("Extraction result saved to {}", output.display()));

        let records = match &data {
            Value::Array(items) => items.len(),
            _ => 1,
        };
        Ok(RunSummary { output, records })
    }
}

/// Close the page. Close failures are logged, never returned.
async fn release<P: PageHandle>(page: P, succeeded: bool) {
    if let Err(e) = page.close().await {
        if succeeded {
            tracing::warn!(error = %e, "failed to close page");
        } else {
            tracing::debug!(error = %e, "failed to close page after error");
        }
    }
}

/// Release the browser session, then, for a remote session, wait for its
/// recording to become available and print where to view it.
///
/// `close` is awaited before the wait starts. Its failure is logged.
pub async fn end_session<F>(close: F, session: Option<&RemoteSession>)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = close.await {
        tracing::warn!(error = %e, "failed to shut down browser");
    }
    let Some(session) = session else {
        return;
    };
    tracing::info!(
        delay_secs = session.settle_delay.as_secs(),
        "session completed, waiting for the recording"
    );
    tokio::time::sleep(session.settle_delay).await;
    sink::announce(&format!(
        "View this session recording in your browser:\n{}",
        session.recording_url
    ));
}
