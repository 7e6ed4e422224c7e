//! Per-URL pipeline: load, generate, validate, quality-check.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::backend::{AgentToolBackend, CompletionBackend, FallbackBackend, GenerationBackend};
use crate::cache::{CacheKey, CacheNamespace, ContentCache};
use crate::config::Config;
use crate::engine::{EngineClient, FallbackExecutor, QueryExecutor};
use crate::fetcher::DocFetcher;
use crate::generate::ContentGenerator;
use crate::parser::parse_document;
use crate::quality::{QualityGate, QualityReport};
use crate::schema::SchemaCatalog;
use crate::types::{LabConfig, ParsedDocument, ValidationSummary};
use crate::validate::{ValidationPolicy, Validator};
use crate::Result;

/// Load a parsed document through the cache layers.
///
/// The parsed namespace is consulted first, then the raw source, then the
/// network. Each miss is written back.
#[instrument(skip(cache, fetcher))]
pub async fn load_document(
    cache: &ContentCache,
    fetcher: &DocFetcher,
    url: &str,
) -> Result<ParsedDocument> {
    let key = CacheKey::for_url(url);
    if let Some(doc) = cache.get_json::<ParsedDocument>(CacheNamespace::Parsed, &key)? {
        debug!("parsed document cache hit");
        return Ok(doc);
    }

    let markdown = if let Some(text) = cache.get_text(CacheNamespace::Source, &key)? {
        debug!("source cache hit");
        text
    } else {
        let text = fetcher.fetch_markdown(url).await?;
        cache.set_text(CacheNamespace::Source, &key, &text)?;
        text
    };

    let doc = parse_document(url, &markdown);
    cache.set_json(CacheNamespace::Parsed, &key, &doc)?;
    Ok(doc)
}

/// Everything produced for one URL.
#[derive(Debug, Clone)]
pub struct LabOutcome {
    /// Output identifier.
    pub slug: String,
    /// URL the lab was generated from.
    pub url: String,
    /// Final artifact, with repaired templates applied.
    pub config: LabConfig,
    /// Validation results.
    pub validation: ValidationSummary,
    /// Quality gate findings.
    pub quality: QualityReport,
}

/// Sequences the components for a single URL.
pub struct LabPipeline {
    cache: Arc<ContentCache>,
    fetcher: DocFetcher,
    generator: Arc<ContentGenerator>,
    validator: Validator,
    gate: QualityGate,
}

impl LabPipeline {
    /// Assemble a pipeline from parts.
    pub fn new(
        cache: Arc<ContentCache>,
        fetcher: DocFetcher,
        generator: Arc<ContentGenerator>,
        validator: Validator,
        gate: QualityGate,
    ) -> Self {
        Self {
            cache,
            fetcher,
            generator,
            validator,
            gate,
        }
    }

    /// Build the production pipeline from configuration.
    ///
    /// The agent tool server becomes the preferred backend and executor only
    /// when configured and reachable.
    pub async fn connect(config: &Config, cache: Arc<ContentCache>) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(SchemaCatalog::load(&config.paths.schemas)?);

        let completion: Arc<dyn GenerationBackend> =
            Arc::new(CompletionBackend::new(&config.completion)?);
        let engine: Arc<dyn QueryExecutor> = Arc::new(EngineClient::new(&config.engine)?);

        let agent = AgentToolBackend::connect(&config.agent).await.map(Arc::new);
        if agent.is_some() {
            info!("agent tool server available, using it as preferred backend");
        } else {
            debug!("agent tool server not configured or unreachable");
        }
        let preferred_backend = agent
            .clone()
            .map(|a| a as Arc<dyn GenerationBackend>);
        let preferred_executor = agent.map(|a| a as Arc<dyn QueryExecutor>);

        let backend = Arc::new(FallbackBackend::new(preferred_backend, completion));
        let executor = Arc::new(FallbackExecutor::new(preferred_executor, engine));

        let generator = Arc::new(ContentGenerator::new(
            backend,
            Arc::clone(&cache),
            Arc::clone(&catalog),
            config.generation.clone(),
        ));
        let datasets = catalog.dataset_names().map(str::to_string).collect();
        let validator = Validator::new(
            executor,
            ValidationPolicy::from(&config.validation),
            datasets,
        )
        .with_repairer(generator.clone());

        Ok(Self::new(
            cache,
            DocFetcher::new()?,
            generator,
            validator,
            QualityGate::new(config.validation.min_hits),
        ))
    }

    /// Fetch (or load from cache) and process `url`.
    pub async fn run(&self, url: &str) -> Result<LabOutcome> {
        let doc = load_document(&self.cache, &self.fetcher, url).await?;
        self.process(&doc).await
    }

    /// Generate, validate and quality-check an already parsed document.
    #[instrument(skip(self, doc), fields(slug = %doc.slug))]
    pub async fn process(&self, doc: &ParsedDocument) -> Result<LabOutcome> {
        let mut config = self.generator.generate(doc).await?;
        let validation = self.validator.validate_all(&config).await;
        apply_repairs(&mut config, &validation);
        let quality = self.gate.run(&config, &validation.results);

        info!(
            examples = config.examples.len(),
            valid = validation.valid,
            warnings = quality.warning_count,
            "lab processed"
        );
        Ok(LabOutcome {
            slug: doc.slug.clone(),
            url: doc.url.clone(),
            config,
            validation,
            quality,
        })
    }
}

/// Substitute repaired templates into the artifact. Results are in example order.
pub fn apply_repairs(config: &mut LabConfig, validation: &ValidationSummary) {
    for (example, result) in config.examples.iter_mut().zip(&validation.results) {
        if let Some(fixed) = &result.repaired_template {
            debug!(example = %example.id, "applying repaired template");
            example.template = fixed.clone();
        }
    }
}
