//! Web search through a Tavily-style search API

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ConfigError, ToolError};
use crate::tool::{Tool, ToolContext};

const TOOL_NAME: &str = "web_search";

/// Environment variable holding the search API key
pub const SEARCH_API_KEY_VAR: &str = "ABODE_SEARCH_API_KEY";

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";

const DEFAULT_MAX_RESULTS: u64 = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    /// Build the tool, trusting an extra PEM bundle when one is given
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        ca_bundle: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("abode/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = ca_bundle {
            let pem = std::fs::read(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let certs = Certificate::from_pem_bundle(&pem)
                .map_err(|e| ConfigError::Certificate(format!("{}: {}", path.display(), e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Certificate(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    async fn search(&self, api_key: &str, query: &str, max_results: u64) -> Result<Value, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "max_results": max_results,
                "include_answer": true,
            }))
            .send()
            .await
            .map_err(|e| ToolError::recoverable(TOOL_NAME, format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ToolError::fatal(
                TOOL_NAME,
                format!("search API rejected the credentials ({})", status),
            ));
        }
        if !status.is_success() {
            return Err(ToolError::recoverable(
                TOOL_NAME,
                format!("search API returned {}", status),
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::recoverable(TOOL_NAME, format!("unreadable response: {}", e)))?;

        let results: Vec<Value> = body
            .results
            .into_iter()
            .map(|hit| json!({ "title": hit.title, "url": hit.url, "content": hit.content }))
            .collect();

        Ok(json!({
            "query": query,
            "answer": body.answer,
            "results": results,
        }))
    }
}

impl std::fmt::Debug for WebSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchTool")
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "搜索互联网上的房产新闻、政策和市场信息。"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "搜索关键词" },
                "max_results": { "type": "integer" }
            },
            "required": ["query"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "answer": { "type": "string" },
                "results": { "type": "array" }
            },
            "required": ["query", "results"]
        })
    }

    fn missing_secret(&self) -> Option<&'static str> {
        match self.api_key {
            Some(_) => None,
            None => Some(SEARCH_API_KEY_VAR),
        }
    }

    async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::fatal(TOOL_NAME, format!("{} is not set", SEARCH_API_KEY_VAR)))?;
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::recoverable(TOOL_NAME, "a search query is required"))?;
        let max_results = input
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 20);

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                Err(ToolError::fatal(TOOL_NAME, "search abandoned: request cancelled"))
            }
            result = self.search(api_key, query, max_results) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_reported() {
        let tool = WebSearchTool::new(DEFAULT_SEARCH_ENDPOINT, None, None).unwrap();
        assert_eq!(tool.missing_secret(), Some(SEARCH_API_KEY_VAR));

        let tool = WebSearchTool::new(DEFAULT_SEARCH_ENDPOINT, Some("  ".into()), None).unwrap();
        assert_eq!(tool.missing_secret(), Some(SEARCH_API_KEY_VAR));

        let tool = WebSearchTool::new(DEFAULT_SEARCH_ENDPOINT, Some("k".into()), None).unwrap();
        assert_eq!(tool.missing_secret(), None);
    }

    #[test]
    fn test_unreadable_ca_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.pem");
        let err = WebSearchTool::new(DEFAULT_SEARCH_ENDPOINT, None, Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        // Unroutable endpoint; cancellation must win.
        let tool = WebSearchTool::new("http://10.255.255.1:9/search", Some("k".into()), None).unwrap();
        let ctx = ToolContext::detached("researcher");
        ctx.cancellation.cancel();

        let err = tool.invoke(json!({"query": "浦东新区 房价"}), &ctx).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.message().contains("cancelled"));
    }
}
