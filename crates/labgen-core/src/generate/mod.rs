//! Artifact generation.
//!
//! [`ContentGenerator`] turns a [`ParsedDocument`] into a normalized
//! [`LabConfig`]:
//!
//! 1. Look up the generation cache, keyed on document content plus the schema
//!    catalog, so a schema change invalidates generations but not fetches.
//! 2. Ask the backend for an artifact. Unparseable or example-free replies
//!    are retried with a strengthened instruction at a higher temperature.
//! 3. Normalize the reply (see [`normalize`]).
//! 4. For multi-dataset languages, expand each example into one query per
//!    dataset.
//! 5. Cache the result. Failures are never cached.
//!
//! The generator also serves as the validator's [`Repairer`].

pub mod normalize;
pub mod prompts;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::backend::{GenerationBackend, RepairRequest, VariantRequest};
use crate::cache::{CacheKey, CacheNamespace, ContentCache};
use crate::config::GenerationConfig;
use crate::schema::SchemaCatalog;
use crate::types::{Example, LabConfig, ParsedDocument, QueryLanguage, Template};
use crate::validate::Repairer;
use crate::{Error, Result};

use normalize::{double_quote_literals, normalize_lab_config, strip_code_fences};

/// Produces lab artifacts and repairs failing templates.
pub struct ContentGenerator {
    backend: Arc<dyn GenerationBackend>,
    cache: Arc<ContentCache>,
    catalog: Arc<SchemaCatalog>,
    settings: GenerationConfig,
}

impl ContentGenerator {
    /// Create a generator over `backend`.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        cache: Arc<ContentCache>,
        catalog: Arc<SchemaCatalog>,
        settings: GenerationConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            catalog,
            settings,
        }
    }

    /// Schema catalog the generator prompts with.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Generate (or load from cache) the artifact for `doc`.
    #[instrument(skip(self, doc), fields(slug = %doc.slug, language = %doc.language))]
    pub async fn generate(&self, doc: &ParsedDocument) -> Result<LabConfig> {
        let key = CacheKey::for_content(&doc.raw_markdown, &self.catalog.to_value());
        if let Some(cached) = self
            .cache
            .get_json::<LabConfig>(CacheNamespace::Generation, &key)?
        {
            if !cached.examples.is_empty() {
                debug!(examples = cached.examples.len(), "generation cache hit");
                return Ok(cached);
            }
        }

        let mut config = self.request_examples(doc).await?;
        normalize_lab_config(&mut config, doc, &self.catalog);
        if config.examples.is_empty() {
            return Err(Error::Generation(format!(
                "no usable examples for '{}' after normalization",
                doc.slug
            )));
        }

        if doc.language.is_multi_dataset() {
            self.expand_variants(&mut config).await;
        }

        self.cache
            .set_json(CacheNamespace::Generation, &key, &config)?;
        info!(examples = config.examples.len(), "generated lab config");
        Ok(config)
    }

    async fn request_examples(&self, doc: &ParsedDocument) -> Result<LabConfig> {
        let attempts = self.settings.empty_retries.saturating_add(1);
        let mut last_problem = String::from("no attempts made");

        for attempt in 0..attempts {
            let retry = attempt > 0;
            let temperature = if retry {
                self.settings.retry_temperature
            } else {
                self.settings.temperature
            };
            let prompt =
                prompts::lab_prompt(doc, &self.catalog, temperature, self.settings.max_tokens, retry);

            let reply = self.backend.generate_artifact(&prompt).await?;
            match serde_json::from_str::<LabConfig>(&strip_code_fences(&reply)) {
                Ok(config) if !config.examples.is_empty() => {
                    if retry {
                        info!(attempt = attempt + 1, "retry produced examples");
                    }
                    return Ok(config);
                },
                Ok(_) => {
                    last_problem = "backend returned an empty examples array".to_string();
                },
                Err(e) => {
                    last_problem = format!("backend reply is not a lab config: {e}");
                },
            }
            warn!(attempt = attempt + 1, of = attempts, "{last_problem}");
        }

        Err(Error::Generation(format!(
            "no examples for '{}' after {attempts} attempts: {last_problem}",
            doc.slug
        )))
    }

    /// Replace each single-query template with a per-dataset mapping.
    ///
    /// The dataset the original query targets keeps it verbatim. A dataset
    /// whose variant cannot be generated is left out of the mapping, which
    /// the validator then reports.
    async fn expand_variants(&self, config: &mut LabConfig) {
        if self.catalog.is_empty() {
            return;
        }
        let language = config.query_language;
        for example in &mut config.examples {
            let Template::Text(query) = &example.template else {
                continue;
            };
            let query = query.clone();
            let source = source_dataset(&query, &example.index, &self.catalog);

            let mut per_dataset = BTreeMap::new();
            for dataset in self.catalog.dataset_names() {
                if source.as_deref() == Some(dataset) {
                    per_dataset.insert(dataset.to_string(), query.clone());
                    continue;
                }
                let request = VariantRequest {
                    language,
                    dataset: dataset.to_string(),
                    concept: concept_of(example),
                    source_query: query.clone(),
                    schema: self.catalog.get(dataset).cloned(),
                };
                match self.backend.generate_variant(&request).await {
                    Ok(variant) => {
                        per_dataset.insert(dataset.to_string(), double_quote_literals(&variant));
                    },
                    Err(e) => {
                        warn!(example = %example.id, dataset, error = %e, "variant generation failed");
                    },
                }
            }
            example.template = Template::PerDataset(per_dataset);
        }
    }
}

fn concept_of(example: &Example) -> String {
    if example.description.trim().is_empty() {
        example.title.clone()
    } else {
        format!("{}: {}", example.title, example.description)
    }
}

/// Dataset a textual query reads from: the example's index when it names a
/// known dataset, otherwise the first `FROM` source.
fn source_dataset(query: &str, index: &str, catalog: &SchemaCatalog) -> Option<String> {
    if catalog.get(index).is_some() {
        return Some(index.to_string());
    }
    let mut tokens = query.split_whitespace();
    let first = tokens.next()?;
    if !first.eq_ignore_ascii_case("FROM") {
        return None;
    }
    let source = tokens.next()?.trim_end_matches(',');
    catalog.get(source).map(|_| source.to_string())
}

#[async_trait]
impl Repairer for ContentGenerator {
    async fn repair(
        &self,
        language: QueryLanguage,
        dataset: &str,
        template: &Template,
        reason: &str,
    ) -> Result<Template> {
        let request = RepairRequest {
            language,
            dataset: dataset.to_string(),
            template: template.clone(),
            reason: reason.to_string(),
            schema: self.catalog.get(dataset).cloned(),
        };
        self.backend.repair(&request).await
    }
}
