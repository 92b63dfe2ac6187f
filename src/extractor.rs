use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::page::PageHandle;
use crate::schema::Schema;

/// What the extraction capability looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// The visible text of the page.
    #[default]
    Text,
    /// A rendered screenshot of the viewport.
    Vision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub instruction: String,
    pub schema: Schema,
    #[serde(default)]
    pub mode: ExtractionMode,
}

impl ExtractionRequest {
    pub fn new(instruction: impl Into<String>, schema: Schema, mode: ExtractionMode) -> Self {
        Self {
            instruction: instruction.into(),
            schema,
            mode,
        }
    }
}

/// Page material shipped to the extraction capability.
#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    Text { url: String, text: String },
    Screenshot { url: String, png: Vec<u8> },
}

impl PageContent {
    pub fn url(&self) -> &str {
        match self {
            PageContent::Text { url, .. } | PageContent::Screenshot { url, .. } => url,
        }
    }
}

/// An external service turning page content into data shaped like the
/// request schema. Results are not deterministic.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest, content: PageContent) -> Result<Value>;
}

/// Run a structured extraction against the loaded page.
///
/// The capability gets at most `timeout` to answer. Its response is conformed
/// to the request schema before being returned.
pub async fn extract<P, C>(
    page: &P,
    capability: &C,
    request: &ExtractionRequest,
    timeout: Duration,
) -> Result<Value>
where
    P: PageHandle + ?Sized,
    C: ExtractionCapability + ?Sized,
{
    if request.instruction.trim().is_empty() {
        return Err(Error::InvalidRequest("instruction must not be empty".into()));
    }

    let url = page
        .url()
        .await?
        .filter(|u| !u.is_empty() && u != "about:blank")
        .ok_or_else(|| Error::NavigationError("page is not attached to a loaded document".into()))?;

    let content = match request.mode {
        ExtractionMode::Text => PageContent::Text {
            text: page.page_text().await?,
            url,
        },
        ExtractionMode::Vision => PageContent::Screenshot {
            png: page.screenshot_png().await?,
            url,
        },
    };

    tracing::info!(mode = ?request.mode, url = content.url(), "requesting extraction");
    let raw = tokio::time::timeout(timeout, capability.extract(request, content))
        .await
        .map_err(|_| Error::ExtractionTimeout(timeout))??;

    request
        .schema
        .conform(&raw)
        .map_err(|e| Error::SchemaValidationError(e.to_string()))
}
