//! Content extraction tools backed by a browse API.
//!
//! Each tool POSTs `{"url": ...}` to its configured endpoint and returns the
//! response's `data` field as JSON, or the raw body when there is none.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use threadbot_core::error::ToolError;
use threadbot_core::tool::Tool;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A single-URL extraction tool (`browser_text`, `github`, `pdf`, `youtube`).
pub struct BrowseApiTool {
    name: &'static str,
    description: &'static str,
    url_description: &'static str,
    api_url: String,
    client: reqwest::Client,
}

impl BrowseApiTool {
    fn new(
        name: &'static str,
        description: &'static str,
        url_description: &'static str,
        api_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name,
            description,
            url_description,
            api_url: api_url.into(),
            client,
        }
    }

    pub fn browser_text(api_url: impl Into<String>) -> Self {
        Self::new(
            "browser_text",
            "Open a webpage using headless Chromium and extracts the title and all displayed text from the page.",
            "URL of the webpage.",
            api_url,
        )
    }

    pub fn github(api_url: impl Into<String>) -> Self {
        Self::new(
            "github",
            "Retrieves metadata and the README file of a GitHub repository.",
            "URL of the GitHub repository.",
            api_url,
        )
    }

    pub fn pdf(api_url: impl Into<String>) -> Self {
        Self::new(
            "pdf",
            "Downloads a PDF file and extracts text from it.",
            "URL of the PDF file",
            api_url,
        )
    }

    pub fn youtube(api_url: impl Into<String>) -> Self {
        Self::new(
            "youtube",
            "Fetches the title, associated channel, description, and subtitles of a YouTube video.",
            "URL of the YouTube video.",
            api_url,
        )
    }
}

/// Pick the `data` field out of an API response body, falling back to the
/// body itself.
fn extract_data(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => match json.get("data") {
            Some(data) if is_truthy(data) => data.to_string(),
            _ => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

#[async_trait]
impl Tool for BrowseApiTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": self.url_description
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        debug!(tool = self.name, url, "Calling browse API");

        let response = match self
            .client
            .post(&self.api_url)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok("(tool call timeout)".into()),
            Err(e) => {
                warn!(tool = self.name, error = %e, "Browse API request failed");
                return Ok(format!("(Exception in tool call: {e})"));
            }
        };

        match response.text().await {
            Ok(body) => Ok(extract_data(&body)),
            Err(e) if e.is_timeout() => Ok("(tool call timeout)".into()),
            Err(e) => Ok(format!("(Exception in tool call: {e})")),
        }
    }
}
