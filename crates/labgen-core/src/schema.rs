//! Dataset schema catalog.
//!
//! A static description of the datasets labs run against. Loaded once per run
//! and shared by reference with the generator (prompt context, defaults) and
//! the validator (which datasets a multi-dataset example must cover).
//!
//! ```json
//! {
//!   "products": {
//!     "fields": {"product_name": "text", "category": "keyword"},
//!     "key_display_field": "product_name",
//!     "searchable_text_fields": ["product_name", "product_description"],
//!     "keyword_field_values": {"category": ["Electronics", "Books"]},
//!     "sample_query": "wireless",
//!     "esql_examples": ["FROM products | WHERE category == \"Electronics\""]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Schema information for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSchema {
    /// Field name to mapping type.
    pub fields: BTreeMap<String, String>,
    /// Field used as the result heading.
    pub key_display_field: Option<String>,
    /// Fields holding free text.
    pub searchable_text_fields: Vec<String>,
    /// Representative values of keyword fields.
    pub keyword_field_values: BTreeMap<String, Vec<String>>,
    /// Search text known to return results.
    pub sample_query: Option<String>,
    /// Known-good textual queries.
    pub esql_examples: Vec<String>,
}

/// Mapping from dataset name to its schema, in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    datasets: BTreeMap<String, DatasetSchema>,
}

impl SchemaCatalog {
    /// Build a catalog from an in-memory mapping.
    #[must_use]
    pub const fn new(datasets: BTreeMap<String, DatasetSchema>) -> Self {
        Self { datasets }
    }

    /// Load the catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read dataset schemas {}: {e}",
                path.display()
            ))
        })?;
        let catalog: Self = serde_json::from_str(&content)?;
        if catalog.is_empty() {
            return Err(Error::Config(format!(
                "Dataset schema catalog {} defines no datasets",
                path.display()
            )));
        }
        Ok(catalog)
    }

    /// Schema for `dataset`, if known.
    #[must_use]
    pub fn get(&self, dataset: &str) -> Option<&DatasetSchema> {
        self.datasets.get(dataset)
    }

    /// Dataset names in stable order.
    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Iterate over `(name, schema)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetSchema)> {
        self.datasets.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// True when no datasets are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Canonical JSON form, used both in prompts and as cache-key context.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.datasets).unwrap_or(serde_json::Value::Null)
    }
}
