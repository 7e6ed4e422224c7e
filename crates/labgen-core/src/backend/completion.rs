//! OpenAI-compatible chat completion backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{ChatPrompt, GenerationBackend, RepairRequest, VariantRequest};
use crate::config::CompletionConfig;
use crate::generate::normalize::{double_quote_literals, strip_code_fences, strip_wrapping_quotes};
use crate::schema::DatasetSchema;
use crate::types::{QueryLanguage, Template};
use crate::{Error, Result};

const REPAIR_TEMPERATURE: f32 = 0.3;
const STRUCTURED_REPAIR_TOKENS: u32 = 2000;
const TEXTUAL_REPAIR_TOKENS: u32 = 500;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client.
pub struct CompletionBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CompletionBackend {
    /// Build a client from configuration. Base URL and key are required.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("OPENAI_BASE_URL is not set".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("labgen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }

    /// Send one chat request and return the reply text.
    #[instrument(skip(self, prompt), fields(model = %self.model, temperature = prompt.temperature))]
    pub async fn chat(&self, prompt: &ChatPrompt) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable {
                backend: "completion".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable {
                backend: "completion".to_string(),
                reason: format!("status {}: {}", status.as_u16(), truncate(&body, 300)),
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Generation("completion returned no content".to_string()))?;
        debug!(chars = content.len(), "completion received");
        Ok(content.trim().to_string())
    }

    async fn repair_structured(&self, request: &RepairRequest) -> Result<Template> {
        let body = request.template.structured_body()?;
        let schema = schema_json(request.schema.as_ref());
        let prompt = ChatPrompt {
            system: "You are an expert at fixing Elasticsearch queries.\n\
                     Your task is to fix queries that return 0 results by adjusting fields, \
                     query text, or structure. Prefer broadening the query over narrowing it."
                .to_string(),
            user: format!(
                "Fix this Elasticsearch query that returned 0 results:\n\n\
                 Query:\n{query}\n\n\
                 Error/Issue: {reason}\n\n\
                 Target Index: {dataset}\n\n\
                 Available Fields for {dataset}:\n{schema}\n\n\
                 Return ONLY the fixed query as a JSON object. Do not include explanations or markdown.",
                query = serde_json::to_string_pretty(&body)?,
                reason = request.reason,
                dataset = request.dataset,
            ),
            temperature: REPAIR_TEMPERATURE,
            max_tokens: STRUCTURED_REPAIR_TOKENS,
        };

        let reply = self.chat(&prompt).await?;
        let fixed: Value = serde_json::from_str(&strip_code_fences(&reply))
            .map_err(|e| Error::Parse(format!("repaired query is not JSON: {e}")))?;
        if !fixed.is_object() {
            return Err(Error::Parse("repaired query is not a JSON object".to_string()));
        }
        Ok(Template::Text(serde_json::to_string_pretty(&fixed)?))
    }

    async fn repair_textual(&self, request: &RepairRequest) -> Result<Template> {
        let query = request
            .template
            .as_text()
            .ok_or_else(|| Error::Parse("textual repair needs a query string".to_string()))?;
        let language = request.language.display_name();
        let prompt = ChatPrompt {
            system: format!(
                "You are an expert at fixing {language} queries.\n\
                 Your task is to fix queries that return 0 results or have errors.\n\n\
                 CRITICAL {language} RULES:\n\
                 1. {language} uses DOUBLE QUOTES for string literals, NOT single quotes\n\
                 2. Use LIKE with wildcards for text search: LIKE \"*term*\"\n\
                 3. For exact matches on keyword fields, use == with double quotes\n\
                 4. Check field names match the schema exactly\n\
                 5. When a filter matches nothing, broaden it rather than adding conditions\n\n\
                 Return ONLY the fixed {language} query string. No explanations, no markdown, no code blocks."
            ),
            user: format!(
                "Fix this {language} query:\n\n\
                 Query: {query}\n\n\
                 Error/Issue: {reason}\n\n\
                 Target Index: {dataset}\n\n\
                 {schema}\n\
                 Return ONLY the fixed {language} query string (no quotes around it, no explanations).",
                reason = request.reason,
                dataset = request.dataset,
                schema = schema_summary(&request.dataset, request.schema.as_ref()),
            ),
            temperature: REPAIR_TEMPERATURE,
            max_tokens: TEXTUAL_REPAIR_TOKENS,
        };

        let reply = self.chat(&prompt).await?;
        let fixed = double_quote_literals(strip_wrapping_quotes(&strip_code_fences(&reply)));
        if fixed.trim().is_empty() {
            return Err(Error::Generation("repair returned an empty query".to_string()));
        }
        Ok(Template::Text(fixed))
    }
}

#[async_trait]
impl GenerationBackend for CompletionBackend {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn generate_artifact(&self, prompt: &ChatPrompt) -> Result<String> {
        self.chat(prompt).await
    }

    async fn generate_variant(&self, request: &VariantRequest) -> Result<String> {
        let language = request.language.display_name();
        let prompt = ChatPrompt {
            system: format!(
                "You are an expert at writing {language} queries against Elasticsearch.\n\
                 Rewrite a query so it targets a different index while demonstrating the same concept.\n\
                 Use DOUBLE QUOTES for string literals and only fields that exist in the schema.\n\
                 Return ONLY the query string. No explanations, no markdown, no code blocks."
            ),
            user: format!(
                "Concept: {concept}\n\n\
                 Original query: {source}\n\n\
                 Target Index: {dataset}\n\n\
                 {schema}\n\
                 Write one {language} query for {dataset} that demonstrates the same concept \
                 and returns at least a few rows.",
                concept = request.concept,
                source = request.source_query,
                dataset = request.dataset,
                schema = schema_summary(&request.dataset, request.schema.as_ref()),
            ),
            temperature: REPAIR_TEMPERATURE,
            max_tokens: TEXTUAL_REPAIR_TOKENS,
        };

        let reply = self.chat(&prompt).await?;
        let query = double_quote_literals(strip_wrapping_quotes(&strip_code_fences(&reply)));
        if query.trim().is_empty() {
            return Err(Error::Generation(format!(
                "variant for '{}' was empty",
                request.dataset
            )));
        }
        Ok(query)
    }

    async fn repair(&self, request: &RepairRequest) -> Result<Template> {
        if request.language == QueryLanguage::QueryDsl {
            self.repair_structured(request).await
        } else {
            self.repair_textual(request).await
        }
    }
}

fn schema_json(schema: Option<&DatasetSchema>) -> String {
    schema
        .and_then(|s| serde_json::to_string_pretty(s).ok())
        .unwrap_or_else(|| "{}".to_string())
}

fn schema_summary(dataset: &str, schema: Option<&DatasetSchema>) -> String {
    let Some(schema) = schema else {
        return format!("Schema for {dataset}: unknown\n");
    };
    let fields: Vec<&str> = schema.fields.keys().map(String::as_str).collect();
    format!(
        "Schema for {dataset}:\n\
         - Fields: {fields:?}\n\
         - Searchable text fields: {text:?}\n\
         - Keyword field values: {keywords}\n\
         - Working examples: {examples:?}\n",
        text = schema.searchable_text_fields,
        keywords = serde_json::to_string_pretty(&schema.keyword_field_values)
            .unwrap_or_else(|_| "{}".to_string()),
        examples = schema.esql_examples,
    )
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
