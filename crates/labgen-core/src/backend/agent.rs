//! Agent tool server client (JSON-RPC 2.0 over HTTP).
//!
//! The server exposes two tools used here:
//!
//! - `platform.core.generate_esql`: natural language to ES|QL, with access to
//!   the live index mappings and values
//! - `platform.core.execute_esql`: runs an ES|QL query
//!
//! Both answer with a `results` array whose items are tagged by `type`. The
//! array shows up in three places depending on server version: at the top
//! level, under `result`, or JSON-encoded inside `result.content[].text`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{ChatPrompt, GenerationBackend, RepairRequest, VariantRequest};
use crate::config::AgentConfig;
use crate::engine::QueryExecutor;
use crate::types::{QueryLanguage, Template};
use crate::{Error, Result};

const GENERATE_TOOL: &str = "platform.core.generate_esql";
const EXECUTE_TOOL: &str = "platform.core.execute_esql";

/// One item of a tool's `results` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    /// A generated query.
    Query {
        /// Payload with the `esql` text.
        #[serde(default)]
        data: Value,
    },
    /// Rows returned by an execution.
    TabularData {
        /// Payload with `columns` and `values`.
        #[serde(default)]
        data: Value,
    },
    /// Tool-level failure.
    Error {
        /// Payload with a `message`.
        #[serde(default)]
        data: Value,
    },
    /// Any item type this client does not use.
    #[serde(other)]
    Other,
}

/// Client for the agent tool server.
pub struct AgentToolBackend {
    client: Client,
    endpoint: String,
}

impl AgentToolBackend {
    /// Build a client for `endpoint` authenticated with `api_key`.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("ApiKey {api_key}"))
            .map_err(|e| Error::Config(format!("Invalid MCP_API_KEY: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .user_agent(concat!("labgen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Build a client when credentials are configured and the server answers.
    pub async fn connect(config: &AgentConfig) -> Option<Self> {
        let (endpoint, key) = config.credentials()?;
        match Self::new(endpoint, key) {
            Ok(agent) if agent.is_available().await => Some(agent),
            Ok(_) => {
                debug!(endpoint, "agent tool server not reachable");
                None
            },
            Err(e) => {
                debug!(endpoint, error = %e, "agent tool server misconfigured");
                None
            },
        }
    }

    /// Probe the server with `tools/list`.
    pub async fn is_available(&self) -> bool {
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        match self.client.post(&self.endpoint).json(&payload).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    #[instrument(skip(self, arguments))]
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Vec<ToolResult>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": tool, "arguments": arguments},
        });

        let unavailable = |reason: String| Error::BackendUnavailable {
            backend: "agent".to_string(),
            reason,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("status {}: {body}", status.as_u16())));
        }

        let envelope: Value = response.json().await?;
        if let Some(err) = envelope.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| err.to_string(), str::to_string);
            return Err(unavailable(message));
        }

        let results = find_results(&envelope)
            .ok_or_else(|| Error::Parse(format!("no results in {tool} response")))?;
        Ok(serde_json::from_value(results)?)
    }

    /// Generate an ES|QL query from a natural-language description.
    pub async fn generate_esql(
        &self,
        query: &str,
        index: Option<&str>,
        context: Option<&str>,
    ) -> Result<String> {
        let mut arguments = json!({ "query": query });
        if let Some(index) = index {
            arguments["index"] = json!(index);
        }
        if let Some(context) = context {
            arguments["context"] = json!(context);
        }

        let results = self.call_tool(GENERATE_TOOL, arguments).await?;
        for item in &results {
            match item {
                ToolResult::Query { data } => {
                    if let Some(esql) = data.get("esql").and_then(Value::as_str) {
                        if !esql.trim().is_empty() {
                            return Ok(esql.trim().to_string());
                        }
                    }
                },
                ToolResult::Error { data } => return Err(tool_error(data)),
                _ => {},
            }
        }
        Err(Error::Parse(
            "generate_esql response contained no query".to_string(),
        ))
    }

    /// Execute an ES|QL query and return the row count.
    pub async fn execute_esql(&self, query: &str) -> Result<u64> {
        let results = self.call_tool(EXECUTE_TOOL, json!({ "query": query })).await?;
        for item in &results {
            match item {
                ToolResult::TabularData { data } => {
                    let rows = data.get("values").and_then(Value::as_array).map_or(0, Vec::len);
                    return Ok(rows as u64);
                },
                ToolResult::Error { data } => return Err(tool_error(data)),
                _ => {},
            }
        }
        Err(Error::Parse(
            "execute_esql response contained no tabular data".to_string(),
        ))
    }
}

fn find_results(envelope: &Value) -> Option<Value> {
    if let Some(results) = envelope.get("results") {
        return Some(results.clone());
    }
    let result = envelope.get("result")?;
    if let Some(results) = result.get("results") {
        return Some(results.clone());
    }
    result
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|c| c.get("text").and_then(Value::as_str))
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find_map(|inner| inner.get("results").cloned())
}

fn tool_error(data: &Value) -> Error {
    let message = data
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| data.to_string(), str::to_string);
    Error::Engine {
        status: 400,
        reason: message,
    }
}

#[async_trait]
impl GenerationBackend for AgentToolBackend {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn generate_artifact(&self, _prompt: &ChatPrompt) -> Result<String> {
        Err(Error::Unsupported(
            "agent tools cannot generate whole lab configs".to_string(),
        ))
    }

    async fn generate_variant(&self, request: &VariantRequest) -> Result<String> {
        if request.language != QueryLanguage::Esql {
            return Err(Error::Unsupported(format!(
                "agent tools only generate ES|QL, not {}",
                request.language
            )));
        }
        let context = format!(
            "Demonstrate the same concept as this query: {}",
            request.source_query
        );
        self.generate_esql(&request.concept, Some(&request.dataset), Some(&context))
            .await
    }

    async fn repair(&self, request: &RepairRequest) -> Result<Template> {
        if request.language != QueryLanguage::Esql {
            return Err(Error::Unsupported(format!(
                "agent tools only repair ES|QL, not {}",
                request.language
            )));
        }
        let failed = request.template.as_text().unwrap_or_default();
        // The tool sees real index values, so ask for a different working
        // example instead of a minimal edit.
        let description = format!(
            "Generate a different ES|QL query against the {} index that demonstrates the same \
             concept and returns results. The previous query failed: {}",
            request.dataset, request.reason
        );
        let context = format!("Previous query: {failed}");
        let query = self
            .generate_esql(&description, Some(&request.dataset), Some(&context))
            .await?;
        Ok(Template::Text(query))
    }
}

#[async_trait]
impl QueryExecutor for AgentToolBackend {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn execute_structured(&self, _dataset: &str, _body: &Value) -> Result<u64> {
        Err(Error::Unsupported(
            "agent tools do not execute structured queries".to_string(),
        ))
    }

    async fn execute_textual(
        &self,
        language: QueryLanguage,
        _dataset: &str,
        query: &str,
    ) -> Result<u64> {
        if language != QueryLanguage::Esql {
            return Err(Error::Unsupported(format!(
                "agent tools only execute ES|QL, not {language}"
            )));
        }
        self.execute_esql(query).await
    }
}
