//! Web search over Google Custom Search and Bing Web Search.
//!
//! Both engines are queried for every call and their results merged into
//! `{"google_results": [...], "bing_results": [...]}`. Results are
//! cacheable: the same query is answered from the tool cache.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use threadbot_core::error::ToolError;
use threadbot_core::tool::Tool;
use tracing::debug;

const GOOGLE_API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Credentials for both search engines.
#[derive(Clone)]
pub struct SearchCredentials {
    pub google_key: String,
    pub google_cx: String,
    pub bing_key: String,
    /// Bing base endpoint; `/v7.0/search` is appended
    pub bing_endpoint: String,
}

pub struct SearchTool {
    credentials: SearchCredentials,
    google_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize, PartialEq)]
struct SearchHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
}

impl SearchHit {
    fn from_item(item: &Value, title: &str, link: &str) -> Option<Self> {
        let field = |k: &str| item.get(k).and_then(Value::as_str).map(String::from);
        let hit = Self {
            title: field(title),
            link: field(link),
            snippet: field("snippet"),
        };
        let empty = hit.title.is_none() && hit.link.is_none() && hit.snippet.is_none();
        (!empty).then_some(hit)
    }
}

impl SearchTool {
    pub fn new(credentials: SearchCredentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            credentials,
            google_url: GOOGLE_API_URL.into(),
            client,
        }
    }

    fn bing_url(&self) -> String {
        format!("{}/v7.0/search", self.credentials.bing_endpoint.trim_end_matches('/'))
    }

    async fn get_json(&self, request: reqwest::RequestBuilder, engine: &str) -> Result<Value, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "search".into(),
            reason: format!("{engine}: {reason}"),
        };

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let response = response.error_for_status().map_err(|e| failed(e.to_string()))?;
        response.json().await.map_err(|e| failed(e.to_string()))
    }

    async fn google(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let request = self.client.get(&self.google_url).query(&[
            ("key", self.credentials.google_key.as_str()),
            ("cx", self.credentials.google_cx.as_str()),
            ("q", query),
        ]);
        let body = self.get_json(request, "google").await?;
        Ok(google_hits(&body))
    }

    async fn bing(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let request = self
            .client
            .get(self.bing_url())
            .header("Ocp-Apim-Subscription-Key", &self.credentials.bing_key)
            .query(&[("q", query)]);
        let body = self.get_json(request, "bing").await?;
        Ok(bing_hits(&body))
    }
}

fn google_hits(body: &Value) -> Vec<SearchHit> {
    body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| SearchHit::from_item(item, "title", "link"))
                .collect()
        })
        .unwrap_or_default()
}

fn bing_hits(body: &Value) -> Vec<SearchHit> {
    body["webPages"]["value"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| SearchHit::from_item(item, "name", "url"))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search on Google and Bing and get the search results. Use concise keywords as query."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query, English only."
                }
            },
            "required": ["query"]
        })
    }

    fn cacheable(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let query = arguments["query"].as_str().unwrap_or("").trim();
        if query.is_empty() {
            return Ok(serde_json::json!({"error": "query is empty"}).to_string());
        }

        debug!(query, "Searching");
        let (google, bing) = tokio::try_join!(self.google(query), self.bing(query))?;

        Ok(serde_json::json!({
            "google_results": google,
            "bing_results": bing,
        })
        .to_string())
    }
}
