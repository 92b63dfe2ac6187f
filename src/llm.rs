use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::extractor::{ExtractionCapability, ExtractionRequest, PageContent};

/// Page text beyond this many characters is not sent to the model.
const MAX_PAGE_CHARS: usize = 24_000;

const SYSTEM_PROMPT: &str = "You extract structured data from web pages. \
Answer only with a JSON value matching the provided schema. \
Use null for optional values that are not present on the page.";

/// Extraction capability backed by an Ollama server's `/api/chat` endpoint.
///
/// The request schema is passed as the `format` constraint; vision requests
/// attach the screenshot as a base64 image, which needs a multimodal model.
pub struct OllamaExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OllamaExtractor {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::LlmError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        })
    }

    /// Bearer token for hosts that sit behind an authenticating proxy.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn chat_payload(&self, request: &ExtractionRequest, content: &PageContent) -> Value {
        let user_message = match content {
            PageContent::Text { url, text } => {
                let text: String = text.chars().take(MAX_PAGE_CHARS).collect();
                json!({
                    "role": "user",
                    "content": format!(
                        "INSTRUCTION: {}\n\nPAGE URL: {url}\n\nPAGE TEXT:\n{text}",
                        request.instruction
                    ),
                })
            }
            PageContent::Screenshot { url, png } => json!({
                "role": "user",
                "content": format!(
                    "INSTRUCTION: {}\n\nPAGE URL: {url}\n\nThe attached image is a screenshot of the page.",
                    request.instruction
                ),
                "images": [base64::engine::general_purpose::STANDARD.encode(png)],
            }),
        };

        json!({
            "model": self.model,
            "stream": false,
            "format": request.schema.to_json_schema(),
            "options": { "temperature": 0.0 },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                user_message,
            ],
        })
    }
}

#[async_trait]
impl ExtractionCapability for OllamaExtractor {
    async fn extract(&self, request: &ExtractionRequest, content: PageContent) -> Result<Value> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = self.chat_payload(request, &content);

        let mut http = self.client.post(&url).json(&payload);
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }
        let resp = http
            .send()
            .await
            .map_err(|e| Error::LlmError(format!("request to {url} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::LlmError(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::LlmError(format!("failed to parse chat response: {e}")))?;
        let text = body
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| Error::LlmError("chat response has no message content".into()))?;
        tracing::debug!(model = %self.model, response = text, "extraction response");

        serde_json::from_str(text.trim()).map_err(|e| {
            Error::SchemaValidationError(format!("model did not return JSON: {e}"))
        })
    }
}
