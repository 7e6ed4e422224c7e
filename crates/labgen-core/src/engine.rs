//! Query engine execution.
//!
//! [`QueryExecutor`] is the seam the validator executes through. Two
//! implementations exist: [`EngineClient`] talks to the search engine REST API
//! directly, and the agent tool backend runs ES|QL through its own tooling.
//! [`FallbackExecutor`] tries the agent first for textual queries and drops
//! to the engine on any failure.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::types::QueryLanguage;
use crate::{Error, Result};

/// Runs queries and reports how many hits or rows came back.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Execute a structured query body against `dataset`; returns the hit count.
    async fn execute_structured(&self, dataset: &str, body: &Value) -> Result<u64>;

    /// Execute a textual query; returns the row count.
    async fn execute_textual(
        &self,
        language: QueryLanguage,
        dataset: &str,
        query: &str,
    ) -> Result<u64>;
}

/// Direct REST client for the search engine.
pub struct EngineClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EngineClient {
    /// Build a client from configuration. The engine URL is required.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("ELASTICSEARCH_URL is not set".to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("labgen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // Error bodies are best effort; only the reason text is wanted.
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            return Err(Error::Engine {
                status: status.as_u16(),
                reason: error_reason(&payload)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
            });
        }
        response.json::<Value>().await.map_err(|e| Error::Engine {
            status: status.as_u16(),
            reason: format!("response body is not valid JSON: {e}"),
        })
    }
}

/// `error.reason` (or a root cause's reason) from an engine error body.
fn error_reason(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    if let Some(reason) = error.as_str() {
        return Some(reason.to_string());
    }
    error
        .get("reason")
        .or_else(|| error.pointer("/root_cause/0/reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Search request body for a structured template: its `query` clause (or the
/// whole template when there is none) with a fixed page size.
#[must_use]
pub fn search_body(template: &Value) -> Value {
    let query = template.get("query").unwrap_or(template);
    json!({ "query": query, "size": 100 })
}

#[async_trait]
impl QueryExecutor for EngineClient {
    fn name(&self) -> &'static str {
        "engine"
    }

    #[instrument(skip(self, body))]
    async fn execute_structured(&self, dataset: &str, body: &Value) -> Result<u64> {
        let response = self
            .post(&format!("/{dataset}/_search"), &search_body(body))
            .await?;
        let total = response.pointer("/hits/total");
        let hits = total
            .and_then(|t| t.get("value").and_then(Value::as_u64).or_else(|| t.as_u64()))
            .unwrap_or(0);
        debug!(hits, "search executed");
        Ok(hits)
    }

    #[instrument(skip(self, query))]
    async fn execute_textual(
        &self,
        language: QueryLanguage,
        dataset: &str,
        query: &str,
    ) -> Result<u64> {
        let rows = match language {
            QueryLanguage::Esql => {
                let response = self.post("/_query", &json!({ "query": query })).await?;
                response
                    .get("values")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len)
            },
            QueryLanguage::Eql => {
                let response = self
                    .post(&format!("/{dataset}/_eql/search"), &json!({ "query": query }))
                    .await?;
                response
                    .pointer("/hits/events")
                    .or_else(|| response.pointer("/hits/sequences"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len)
            },
            QueryLanguage::QueryDsl => {
                return Err(Error::Unsupported(
                    "Query DSL is executed as a structured query".to_string(),
                ));
            },
        };
        debug!(rows, "textual query executed");
        Ok(rows as u64)
    }
}

/// Prefers a specialized executor for textual queries.
///
/// Structured queries always go to the engine. Textual queries try the
/// preferred executor first; any error falls back to the engine.
pub struct FallbackExecutor {
    preferred: Option<Arc<dyn QueryExecutor>>,
    engine: Arc<dyn QueryExecutor>,
}

impl FallbackExecutor {
    /// Compose `engine` with an optional preferred executor.
    pub fn new(preferred: Option<Arc<dyn QueryExecutor>>, engine: Arc<dyn QueryExecutor>) -> Self {
        Self { preferred, engine }
    }
}

#[async_trait]
impl QueryExecutor for FallbackExecutor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn execute_structured(&self, dataset: &str, body: &Value) -> Result<u64> {
        self.engine.execute_structured(dataset, body).await
    }

    async fn execute_textual(
        &self,
        language: QueryLanguage,
        dataset: &str,
        query: &str,
    ) -> Result<u64> {
        if let Some(preferred) = &self.preferred {
            match preferred.execute_textual(language, dataset, query).await {
                Ok(rows) => {
                    debug!(backend = preferred.name(), dataset, rows, "execution served");
                    return Ok(rows);
                },
                Err(Error::Unsupported(_)) => {
                    debug!(
                        primary = preferred.name(),
                        backend = self.engine.name(),
                        dataset,
                        "preferred executor does not support query, using engine"
                    );
                },
                Err(e) => {
                    warn!(
                        primary = preferred.name(),
                        backend = self.engine.name(),
                        dataset,
                        error = %e,
                        "preferred executor failed, using engine"
                    );
                },
            }
        }
        let rows = self.engine.execute_textual(language, dataset, query).await?;
        debug!(backend = self.engine.name(), dataset, rows, "execution served");
        Ok(rows)
    }
}
