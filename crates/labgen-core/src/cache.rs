//! Content-addressed cache for fetched pages, parsed documents and
//! generation responses.
//!
//! ## Storage Layout
//!
//! ```text
//! .generate-labs-cache/
//!   markdown/
//!     <sha256(url)>.md            # Raw source text
//!     <sha256(url)>.parsed.json   # Parsed document
//!   llm/
//!     <sha256(doc + schemas)>.json  # Generated artifacts
//! ```
//!
//! Entries are immutable: a write replaces the whole file through a temp file
//! and rename. A disabled cache never reads and never writes, but leaves
//! existing entries in place.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Independent key spaces inside the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Raw documentation text, keyed by URL.
    Source,
    /// Parsed documents, keyed by URL.
    Parsed,
    /// Generation backend responses, keyed by content and schema context.
    Generation,
}

impl CacheNamespace {
    const fn dir(self) -> &'static str {
        match self {
            Self::Source | Self::Parsed => "markdown",
            Self::Generation => "llm",
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Source => "md",
            Self::Parsed => "parsed.json",
            Self::Generation => "json",
        }
    }
}

/// Hex-encoded SHA-256 digest addressing a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for data derived from a URL.
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        Self(hex_digest(url.as_bytes()))
    }

    /// Key for a generation response.
    ///
    /// Depends on both the document content and the auxiliary context, so
    /// a schema change invalidates generations without touching fetches.
    /// Object keys are serialized in sorted order, which makes the key
    /// independent of how `auxiliary` was built.
    #[must_use]
    pub fn for_content(content: &str, auxiliary: &serde_json::Value) -> Self {
        let canonical = json!({ "doc": content, "schemas": auxiliary }).to_string();
        Self(hex_digest(canonical.as_bytes()))
    }

    /// Digest as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// File-backed content cache.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
    enabled: bool,
}

impl ContentCache {
    /// Open a cache rooted at `root`, creating namespace directories when enabled.
    pub fn open(root: impl AsRef<Path>, enabled: bool) -> Result<Self> {
        let cache = Self {
            root: root.as_ref().to_path_buf(),
            enabled,
        };
        if enabled {
            cache.ensure_dirs()?;
        }
        Ok(cache)
    }

    /// Whether reads and writes are active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_dirs(&self) -> Result<()> {
        for ns in [CacheNamespace::Source, CacheNamespace::Generation] {
            fs::create_dir_all(self.root.join(ns.dir())).map_err(|e| {
                Error::Storage(format!("Failed to create cache directory: {e}"))
            })?;
        }
        Ok(())
    }

    fn entry_path(&self, namespace: CacheNamespace, key: &CacheKey) -> PathBuf {
        self.root
            .join(namespace.dir())
            .join(format!("{}.{}", key.as_str(), namespace.extension()))
    }

    /// Read a text entry.
    pub fn get_text(&self, namespace: CacheNamespace, key: &CacheKey) -> Result<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.entry_path(namespace, key);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(?namespace, key = %key, "cache hit");
                Ok(Some(text))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(path = %path.display(), "ignoring unreadable cache entry: {e}");
                Ok(None)
            },
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write a text entry, replacing any previous value.
    pub fn set_text(&self, namespace: CacheNamespace, key: &CacheKey, value: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.write_atomic(&self.entry_path(namespace, key), value.as_bytes())
    }

    /// Read and deserialize a JSON entry.
    ///
    /// A malformed entry is reported as a miss.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        key: &CacheKey,
    ) -> Result<Option<T>> {
        let Some(text) = self.get_text(namespace, key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(?namespace, key = %key, "ignoring corrupt cache entry: {e}");
                Ok(None)
            },
        }
    }

    /// Serialize and write a JSON entry.
    pub fn set_json<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: &CacheKey,
        value: &T,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Storage(format!("Failed to serialize cache entry: {e}")))?;
        self.write_atomic(&self.entry_path(namespace, key), json.as_bytes())
    }

    /// Delete every entry and recreate empty namespaces.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .map_err(|e| Error::Storage(format!("Failed to clear cache: {e}")))?;
        }
        self.ensure_dirs()?;
        debug!(root = %self.root.display(), "cache cleared");
        Ok(())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Storage(format!("Invalid cache path {}", path.display())))?;
        fs::create_dir_all(dir)
            .map_err(|e| Error::Storage(format!("Failed to create cache directory: {e}")))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::Storage(format!("Failed to create temp cache file: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| Error::Storage(format!("Failed to write temp cache file: {e}")))?;
        tmp.persist(path)
            .map_err(|e| Error::Storage(format!("Failed to commit cache file: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(temp: &TempDir, enabled: bool) -> ContentCache {
        ContentCache::open(temp.path().join("cache"), enabled).unwrap()
    }

    #[test]
    fn test_layout_matches_namespaces() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp, true);
        let key = CacheKey::for_url("https://example.com/doc");

        cache.set_text(CacheNamespace::Source, &key, "# Doc").unwrap();
        cache
            .set_json(CacheNamespace::Parsed, &key, &json!({"title": "Doc"}))
            .unwrap();
        cache
            .set_json(CacheNamespace::Generation, &key, &json!({"examples": []}))
            .unwrap();

        let root = temp.path().join("cache");
        assert!(root.join("markdown").join(format!("{key}.md")).exists());
        assert!(root.join("markdown").join(format!("{key}.parsed.json")).exists());
        assert!(root.join("llm").join(format!("{key}.json")).exists());
    }

    #[test]
    fn test_disabled_cache_ignores_existing_entries() {
        let temp = TempDir::new().unwrap();
        let key = CacheKey::for_url("https://example.com/doc");
        open(&temp, true)
            .set_text(CacheNamespace::Source, &key, "cached")
            .unwrap();

        let disabled = open(&temp, false);
        assert!(disabled.get_text(CacheNamespace::Source, &key).unwrap().is_none());
        disabled
            .set_text(CacheNamespace::Source, &key, "overwritten")
            .unwrap();

        // Existing entry survives untouched
        let enabled = open(&temp, true);
        assert_eq!(
            enabled.get_text(CacheNamespace::Source, &key).unwrap().as_deref(),
            Some("cached")
        );
    }

    #[test]
    fn test_corrupt_json_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp, true);
        let key = CacheKey::for_url("https://example.com/doc");
        cache
            .set_text(CacheNamespace::Generation, &key, "{not json")
            .unwrap();

        let value: Option<serde_json::Value> =
            cache.get_json(CacheNamespace::Generation, &key).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_clear_recreates_empty_namespaces() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp, true);
        let key = CacheKey::for_url("https://example.com/doc");
        cache.set_text(CacheNamespace::Source, &key, "x").unwrap();

        cache.clear().unwrap();

        assert!(cache.get_text(CacheNamespace::Source, &key).unwrap().is_none());
        assert!(temp.path().join("cache").join("markdown").is_dir());
        assert!(temp.path().join("cache").join("llm").is_dir());
    }

    #[test]
    fn test_content_key_depends_on_auxiliary() {
        let a = CacheKey::for_content("doc", &json!({"products": {"fields": {}}}));
        let b = CacheKey::for_content("doc", &json!({"products": {"fields": {"x": "text"}}}));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    proptest! {
        #[test]
        fn test_content_key_is_order_independent(
            k1 in "[a-z]{1,8}",
            k2 in "[A-Z]{1,8}",
            v1 in ".{0,20}",
            v2 in ".{0,20}",
            doc in ".{0,100}",
        ) {
            let mut forward = serde_json::Map::new();
            forward.insert(k1.clone(), json!(v1));
            forward.insert(k2.clone(), json!(v2));
            let mut reverse = serde_json::Map::new();
            reverse.insert(k2, json!(v2));
            reverse.insert(k1, json!(v1));

            prop_assert_eq!(
                CacheKey::for_content(&doc, &serde_json::Value::Object(forward)),
                CacheKey::for_content(&doc, &serde_json::Value::Object(reverse))
            );
        }

        #[test]
        fn test_get_after_set_returns_value(url in "https://[a-z]{1,12}\\.com/[a-z/]{0,20}", body in ".{0,200}") {
            let temp = TempDir::new().unwrap();
            let cache = open(&temp, true);
            let key = CacheKey::for_url(&url);

            cache.set_text(CacheNamespace::Source, &key, &body).unwrap();
            let read = cache.get_text(CacheNamespace::Source, &key).unwrap();
            prop_assert_eq!(read.as_deref(), Some(body.as_str()));
        }
    }
}
