#![allow(clippy::unwrap_used)]
//! End-to-end pipeline scenarios with scripted backends and executors.

use async_trait::async_trait;
use labgen_core::{
    CacheKey, CacheNamespace, ChatPrompt, ContentCache, ContentGenerator, DatasetSchema,
    DocFetcher, Error, GenerationBackend, GenerationConfig, LabConfig, LabPipeline,
    QualityGate, QueryExecutor, QueryLanguage, RepairRequest, Result, SchemaCatalog, Template,
    ValidationPolicy, Validator, VariantRequest,
};
use labgen_core::parser::parse_document;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct MockBackend {
    artifacts: Mutex<Vec<String>>,
    variants: Mutex<HashMap<String, String>>,
    repairs: Mutex<Vec<Template>>,
    artifact_calls: AtomicUsize,
    repair_calls: AtomicUsize,
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_artifact(&self, _prompt: &ChatPrompt) -> Result<String> {
        self.artifact_calls.fetch_add(1, Ordering::SeqCst);
        let mut artifacts = self.artifacts.lock().unwrap();
        if artifacts.is_empty() {
            return Err(Error::Other("no scripted artifact".to_string()));
        }
        Ok(artifacts.remove(0))
    }

    async fn generate_variant(&self, request: &VariantRequest) -> Result<String> {
        self.variants
            .lock()
            .unwrap()
            .get(&request.dataset)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no variant for {}", request.dataset)))
    }

    async fn repair(&self, _request: &RepairRequest) -> Result<Template> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        let mut repairs = self.repairs.lock().unwrap();
        if repairs.is_empty() {
            return Err(Error::Other("no scripted repair".to_string()));
        }
        Ok(repairs.remove(0))
    }
}

/// Returns a fixed count per query text (compact JSON for structured bodies).
#[derive(Default)]
struct MockEngine {
    counts: HashMap<String, u64>,
    executions: AtomicUsize,
}

impl MockEngine {
    fn with(mut self, query: &str, count: u64) -> Self {
        self.counts.insert(query.to_string(), count);
        self
    }

    fn count(&self, key: &str) -> u64 {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.counts.get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QueryExecutor for MockEngine {
    fn name(&self) -> &'static str {
        "mock-engine"
    }

    async fn execute_structured(&self, _dataset: &str, body: &Value) -> Result<u64> {
        Ok(self.count(&body.to_string()))
    }

    async fn execute_textual(
        &self,
        _language: QueryLanguage,
        _dataset: &str,
        query: &str,
    ) -> Result<u64> {
        Ok(self.count(query))
    }
}

fn catalog() -> SchemaCatalog {
    let mut datasets = BTreeMap::new();
    for (name, display, search) in [
        ("products", "product_name", "product_description"),
        ("product_reviews", "review_title", "review_text"),
        ("product_users", "username", "interests"),
    ] {
        datasets.insert(
            name.to_string(),
            DatasetSchema {
                key_display_field: Some(display.to_string()),
                searchable_text_fields: vec![search.to_string()],
                ..DatasetSchema::default()
            },
        );
    }
    SchemaCatalog::new(datasets)
}

struct Harness {
    _temp: TempDir,
    cache: Arc<ContentCache>,
    pipeline: LabPipeline,
}

fn harness(backend: Arc<MockBackend>, engine: Arc<MockEngine>, repair: bool) -> Harness {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(ContentCache::open(temp.path(), true).unwrap());
    let catalog = Arc::new(catalog());
    let generator = Arc::new(ContentGenerator::new(
        backend,
        Arc::clone(&cache),
        Arc::clone(&catalog),
        GenerationConfig::default(),
    ));
    let datasets = catalog.dataset_names().map(str::to_string).collect();
    let mut validator = Validator::new(engine, ValidationPolicy::default(), datasets);
    if repair {
        validator = validator.with_repairer(generator.clone());
    }
    let pipeline = LabPipeline::new(
        Arc::clone(&cache),
        DocFetcher::new().unwrap(),
        generator,
        validator,
        QualityGate::new(3),
    );
    Harness {
        _temp: temp,
        cache,
        pipeline,
    }
}

const Q1: &str = r#"{"query":{"match":{"product_name":"wireless"}}}"#;
const Q2: &str = r#"{"query":{"match":{"review_text":"comfortable"}}}"#;
const Q3: &str = r#"{"query":{"match":{"interests":"Electronics"}}}"#;
const Q4_BAD: &str = r#"{"query":{"match":{"review_title":"nonexistent phrase"}}}"#;
const Q4_FIXED: &str = r#"{"query":{"match":{"review_title":"great"}}}"#;

fn dsl_artifact() -> String {
    let example = |id: &str, title: &str, template: &str, index: &str| {
        json!({
            "id": id,
            "title": title,
            "description": format!("{title} demonstration"),
            "template": template,
            "index": index,
            "tryThis": ["Change the search text to something else"],
            "tooltips": {"match": "Full-text match"}
        })
    };
    json!({
        "queryLanguage": "query_dsl",
        "displayName": "Match Query",
        "description": "Returns documents that match a provided text.",
        "examples": [
            example("products", "Products", Q1, "products"),
            example("reviews", "Reviews", Q2, "product_reviews"),
            example("users", "Users", Q3, "product_users"),
            example("titles", "Titles", Q4_BAD, "product_reviews"),
        ]
    })
    .to_string()
}

#[tokio::test]
async fn one_example_repaired_on_second_attempt() {
    let backend = Arc::new(MockBackend {
        artifacts: Mutex::new(vec![dsl_artifact()]),
        repairs: Mutex::new(vec![Template::Text(Q4_FIXED.to_string())]),
        ..MockBackend::default()
    });
    let engine = Arc::new(
        MockEngine::default()
            .with(Q1, 10)
            .with(Q2, 8)
            .with(Q3, 6)
            .with(Q4_BAD, 0)
            .with(Q4_FIXED, 5),
    );
    let h = harness(backend.clone(), engine.clone(), true);
    let doc = parse_document(
        "https://www.elastic.co/docs/reference/query-languages/query-dsl/query-dsl-match-query",
        "# Match query\n\nReturns documents that match a provided text.\n",
    );

    let outcome = h.pipeline.process(&doc).await.unwrap();

    assert_eq!(outcome.slug, "match-query");
    assert_eq!(outcome.validation.total, 4);
    assert_eq!(outcome.validation.valid, 4);
    let repaired: Vec<_> = outcome
        .validation
        .results
        .iter()
        .filter(|r| r.repaired_template.is_some())
        .collect();
    assert_eq!(repaired.len(), 1);
    assert_eq!(repaired[0].example_id, "titles");
    assert_eq!(
        outcome.config.examples[3].template,
        Template::Text(Q4_FIXED.to_string())
    );
    assert_eq!(backend.repair_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.executions.load(Ordering::SeqCst), 5);
    assert!(outcome.quality.passed, "{:?}", outcome.quality.warnings);
    assert_eq!(outcome.quality.warning_count, 0);
}

#[tokio::test]
async fn empty_generations_fail_and_are_not_cached() {
    let empty = r#"{"displayName": "Match", "examples": []}"#.to_string();
    let backend = Arc::new(MockBackend {
        artifacts: Mutex::new(vec![empty.clone(), empty.clone(), empty.clone(), empty]),
        ..MockBackend::default()
    });
    let h = harness(backend.clone(), Arc::new(MockEngine::default()), true);
    let doc = parse_document("https://x/query-dsl-match-query", "# Match query\n");

    let err = h.pipeline.process(&doc).await.unwrap_err();

    assert!(matches!(err, Error::Generation(_)), "unexpected: {err}");
    assert_eq!(backend.artifact_calls.load(Ordering::SeqCst), 4);
    let key = CacheKey::for_content(&doc.raw_markdown, &catalog().to_value());
    assert!(
        h.cache
            .get_json::<LabConfig>(CacheNamespace::Generation, &key)
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn per_dataset_rows_below_threshold_invalidate_example() {
    let artifact = json!({
        "displayName": "ES|QL WHERE",
        "description": "Filter rows",
        "examples": [{
            "id": "where",
            "title": "Filter",
            "description": "Keep matching rows",
            "template": "FROM products | WHERE category == 'Electronics'",
            "index": "products"
        }]
    })
    .to_string();
    let backend = Arc::new(MockBackend {
        artifacts: Mutex::new(vec![artifact]),
        variants: Mutex::new(HashMap::from([
            (
                "product_reviews".to_string(),
                "FROM product_reviews | WHERE rating == 1".to_string(),
            ),
            (
                "product_users".to_string(),
                "FROM product_users | WHERE age > 200".to_string(),
            ),
        ])),
        ..MockBackend::default()
    });
    let engine = Arc::new(
        MockEngine::default()
            .with("FROM products | WHERE category == \"Electronics\"", 5)
            .with("FROM product_reviews | WHERE rating == 1", 2)
            .with("FROM product_users | WHERE age > 200", 0),
    );
    let h = harness(backend, engine, false);
    let doc = parse_document(
        "https://www.elastic.co/docs/reference/query-languages/esql/esql-commands",
        "# ES|QL commands\n\nPiped queries.\n",
    );

    let outcome = h.pipeline.process(&doc).await.unwrap();

    let result = &outcome.validation.results[0];
    assert!(!result.valid);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("product_reviews: only 2 rows (<3 rows)"), "{error}");
    assert!(error.contains("product_users: query returned 0 rows"), "{error}");
    assert!(!error.contains("products:"), "{error}");
    assert!(
        outcome
            .quality
            .warnings
            .iter()
            .any(|w| w.example_id.as_deref() == Some("where"))
    );
}
