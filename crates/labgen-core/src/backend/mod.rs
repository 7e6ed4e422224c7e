//! Content generation backends.
//!
//! Two implementations sit behind [`GenerationBackend`]:
//!
//! - [`CompletionBackend`]: a generic chat completion API. Serves every
//!   operation and is always configured.
//! - [`AgentToolBackend`]: a domain-tuned tool server with live access to the
//!   indexed data. Generates and repairs textual queries but cannot produce a
//!   whole artifact.
//!
//! [`FallbackBackend`] composes them: the agent is tried first when present,
//! and any failure falls through to the completion backend. Callers only see
//! the trait.

mod agent;
mod completion;

pub use agent::{AgentToolBackend, ToolResult};
pub use completion::CompletionBackend;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::schema::DatasetSchema;
use crate::types::{QueryLanguage, Template};
use crate::Result;

/// A chat-style generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    /// System instruction.
    pub system: String,
    /// User instruction.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
}

/// Request for a per-dataset variant of an example query.
#[derive(Debug, Clone)]
pub struct VariantRequest {
    /// Language of the query.
    pub language: QueryLanguage,
    /// Dataset the variant must target.
    pub dataset: String,
    /// Natural-language statement of the concept being demonstrated.
    pub concept: String,
    /// Query the variant is derived from.
    pub source_query: String,
    /// Schema of the target dataset, when known.
    pub schema: Option<DatasetSchema>,
}

/// Request to repair a failing template.
#[derive(Debug, Clone)]
pub struct RepairRequest {
    /// Language of the template.
    pub language: QueryLanguage,
    /// Dataset the template runs against.
    pub dataset: String,
    /// The failing template.
    pub template: Template,
    /// Why the last execution failed.
    pub reason: String,
    /// Schema of the target dataset, when known.
    pub schema: Option<DatasetSchema>,
}

/// Capability interface shared by every generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce raw artifact text for a chat prompt.
    async fn generate_artifact(&self, prompt: &ChatPrompt) -> Result<String>;

    /// Produce a query for one dataset that demonstrates the same concept.
    async fn generate_variant(&self, request: &VariantRequest) -> Result<String>;

    /// Produce a corrected template.
    async fn repair(&self, request: &RepairRequest) -> Result<Template>;
}

/// Prefers a specialized backend and falls back to a generic one.
pub struct FallbackBackend {
    primary: Option<Arc<dyn GenerationBackend>>,
    fallback: Arc<dyn GenerationBackend>,
}

impl FallbackBackend {
    /// Compose `fallback` with an optional preferred backend.
    pub fn new(
        primary: Option<Arc<dyn GenerationBackend>>,
        fallback: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self { primary, fallback }
    }

    fn log_fallback(&self, primary: &dyn GenerationBackend, op: &str, err: &crate::Error) {
        if matches!(err, crate::Error::Unsupported(_)) {
            debug!(
                operation = op,
                primary = primary.name(),
                backend = self.fallback.name(),
                "primary backend does not support operation"
            );
        } else {
            warn!(
                operation = op,
                primary = primary.name(),
                backend = self.fallback.name(),
                error = %err,
                "primary backend failed, using fallback"
            );
        }
    }
}

#[async_trait]
impl GenerationBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn generate_artifact(&self, prompt: &ChatPrompt) -> Result<String> {
        if let Some(primary) = &self.primary {
            match primary.generate_artifact(prompt).await {
                Ok(text) => {
                    debug!(operation = "artifact", backend = primary.name(), "served");
                    return Ok(text);
                },
                Err(e) => self.log_fallback(primary.as_ref(), "artifact", &e),
            }
        }
        let text = self.fallback.generate_artifact(prompt).await?;
        debug!(operation = "artifact", backend = self.fallback.name(), "served");
        Ok(text)
    }

    async fn generate_variant(&self, request: &VariantRequest) -> Result<String> {
        if let Some(primary) = &self.primary {
            match primary.generate_variant(request).await {
                Ok(query) => {
                    debug!(operation = "variant", dataset = %request.dataset, backend = primary.name(), "served");
                    return Ok(query);
                },
                Err(e) => self.log_fallback(primary.as_ref(), "variant", &e),
            }
        }
        let query = self.fallback.generate_variant(request).await?;
        debug!(operation = "variant", dataset = %request.dataset, backend = self.fallback.name(), "served");
        Ok(query)
    }

    async fn repair(&self, request: &RepairRequest) -> Result<Template> {
        if let Some(primary) = &self.primary {
            match primary.repair(request).await {
                Ok(template) => {
                    debug!(operation = "repair", dataset = %request.dataset, backend = primary.name(), "served");
                    return Ok(template);
                },
                Err(e) => self.log_fallback(primary.as_ref(), "repair", &e),
            }
        }
        let template = self.fallback.repair(request).await?;
        debug!(operation = "repair", dataset = %request.dataset, backend = self.fallback.name(), "served");
        Ok(template)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend: pops queued responses and counts calls.
    pub(crate) struct ScriptedBackend {
        pub(crate) name: &'static str,
        pub(crate) artifacts: Mutex<Vec<Result<String>>>,
        pub(crate) variants: Mutex<Vec<Result<String>>>,
        pub(crate) repairs: Mutex<Vec<Result<Template>>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(name: &'static str) -> Self {
            Self {
                name,
                artifacts: Mutex::new(Vec::new()),
                variants: Mutex::new(Vec::new()),
                repairs: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_artifact(self, response: Result<String>) -> Self {
            self.artifacts.lock().unwrap().push(response);
            self
        }

        pub(crate) fn with_variant(self, response: Result<String>) -> Self {
            self.variants.lock().unwrap().push(response);
            self
        }

        pub(crate) fn with_repair(self, response: Result<Template>) -> Self {
            self.repairs.lock().unwrap().push(response);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next<T>(queue: &Mutex<Vec<Result<T>>>) -> Result<T> {
            let mut queue = queue.lock().unwrap();
            if queue.is_empty() {
                Err(Error::Other("script exhausted".to_string()))
            } else {
                queue.remove(0)
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn generate_artifact(&self, prompt: &ChatPrompt) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            Self::next(&self.artifacts)
        }

        async fn generate_variant(&self, _request: &VariantRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Self::next(&self.variants)
        }

        async fn repair(&self, _request: &RepairRequest) -> Result<Template> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Self::next(&self.repairs)
        }
    }

    fn repair_request() -> RepairRequest {
        RepairRequest {
            language: QueryLanguage::Esql,
            dataset: "products".to_string(),
            template: Template::Text("FROM products".to_string()),
            reason: "0 rows".to_string(),
            schema: None,
        }
    }

    #[tokio::test]
    async fn test_primary_serves_when_healthy() {
        let primary = Arc::new(
            ScriptedBackend::new("agent").with_repair(Ok(Template::Text("FROM a".to_string()))),
        );
        let fallback = Arc::new(ScriptedBackend::new("completion"));
        let backend = FallbackBackend::new(Some(primary.clone()), fallback.clone());

        let repaired = backend.repair(&repair_request()).await.unwrap();

        assert_eq!(repaired, Template::Text("FROM a".to_string()));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_through() {
        let primary = Arc::new(ScriptedBackend::new("agent").with_repair(Err(
            Error::BackendUnavailable {
                backend: "agent".to_string(),
                reason: "connection refused".to_string(),
            },
        )));
        let fallback = Arc::new(
            ScriptedBackend::new("completion")
                .with_repair(Ok(Template::Text("FROM b".to_string()))),
        );
        let backend = FallbackBackend::new(Some(primary.clone()), fallback.clone());

        let repaired = backend.repair(&repair_request()).await.unwrap();

        assert_eq!(repaired, Template::Text("FROM b".to_string()));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_variant_falls_through() {
        let primary = Arc::new(
            ScriptedBackend::new("agent")
                .with_variant(Err(Error::Unsupported("query dsl variants".to_string()))),
        );
        let fallback = Arc::new(
            ScriptedBackend::new("completion")
                .with_variant(Ok("FROM product_users | LIMIT 5".to_string())),
        );
        let backend = FallbackBackend::new(Some(primary.clone()), fallback.clone());
        let request = VariantRequest {
            language: QueryLanguage::Esql,
            dataset: "product_users".to_string(),
            concept: "Limit rows".to_string(),
            source_query: "FROM products | LIMIT 5".to_string(),
            schema: None,
        };

        let variant = backend.generate_variant(&request).await.unwrap();

        assert_eq!(variant, "FROM product_users | LIMIT 5");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_error_propagates() {
        let fallback = Arc::new(
            ScriptedBackend::new("completion")
                .with_artifact(Err(Error::Generation("bad".to_string()))),
        );
        let backend = FallbackBackend::new(None, fallback);
        let prompt = ChatPrompt {
            system: String::new(),
            user: String::new(),
            temperature: 0.7,
            max_tokens: 10,
        };

        let err = backend.generate_artifact(&prompt).await.unwrap_err();
        assert_eq!(err.category(), "generation");
    }
}
