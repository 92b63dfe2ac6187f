use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page as CrPage;
use chromiumoxide::page::ScreenshotParams;
use serde_json::Value;

use crate::error::{Error, Result};

/// A single loaded browser tab, as seen by the collector and the extractor.
///
/// Implementations own the underlying tab. `close` consumes the handle so a
/// page cannot be used after it has been released.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate to `url` and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<()>;

    /// URL of the currently loaded document, if any.
    async fn url(&self) -> Result<Option<String>>;

    /// Evaluate a JavaScript expression in page context and return its value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Visible text of the document body.
    async fn page_text(&self) -> Result<String>;

    /// PNG screenshot of the visible viewport.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    /// Release the tab.
    async fn close(self) -> Result<()>;
}

/// Wrapper around a chromiumoxide Page.
pub struct Page {
    inner: CrPage,
    default_timeout: Duration,
}

impl Page {
    pub(crate) fn new(inner: CrPage, default_timeout: Duration) -> Self {
        Self { inner, default_timeout }
    }
}

#[async_trait]
impl PageHandle for Page {
    async fn goto(&self, url: &str) -> Result<()> {
        tracing::info!(url, "navigating");
        match tokio::time::timeout(self.default_timeout, self.inner.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::NavigationError(e.to_string())),
            Err(_) => Err(Error::NavigationError(format!(
                "timed out after {:?} loading {url}",
                self.default_timeout
            ))),
        }
    }

    async fn url(&self) -> Result<Option<String>> {
        self.inner
            .url()
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .inner
            .evaluate(expression)
            .await
            .map_err(|e| Error::EvaluationError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn page_text(&self) -> Result<String> {
        let value = self
            .evaluate("document.body ? document.body.innerText : ''")
            .await?;
        match value {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Err(Error::EvaluationError(format!(
                "expected page text, got {other}"
            ))),
        }
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| Error::EvaluationError(format!("screenshot failed: {e}")))
    }

    async fn close(self) -> Result<()> {
        tracing::debug!("closing page");
        self.inner.close().await?;
        Ok(())
    }
}
