//! Caching layer for revtrust-runtime.
//!
//! Scoring is deterministic for a fixed set of artifacts, so a result
//! computed once stays correct until the artifacts change. The cache lives
//! inside the service that owns those artifacts and dies with it.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use revtrust_core::{EnsembleResult, Explanation};

/// Cache key for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text_hash: u64,
    /// `None` for predictions, the list length for explanations
    top_n: Option<usize>,
}

impl CacheKey {
    pub fn prediction(text: &str) -> Self {
        Self {
            text_hash: hash_text(text),
            top_n: None,
        }
    }

    pub fn explanation(text: &str, top_n: usize) -> Self {
        Self {
            text_hash: hash_text(text),
            top_n: Some(top_n),
        }
    }
}

/// Result cache using moka.
pub struct ResultCache {
    predictions: Cache<CacheKey, EnsembleResult>,
    explanations: Cache<CacheKey, Explanation>,
}

impl ResultCache {
    /// Create a new cache with the given capacity per result kind.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            predictions: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            explanations: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get_prediction(&self, key: &CacheKey) -> Option<EnsembleResult> {
        self.predictions.get(key).await
    }

    pub async fn insert_prediction(&self, key: CacheKey, result: EnsembleResult) {
        self.predictions.insert(key, result).await;
    }

    pub async fn get_explanation(&self, key: &CacheKey) -> Option<Explanation> {
        self.explanations.get(key).await
    }

    pub async fn insert_explanation(&self, key: CacheKey, explanation: Explanation) {
        self.explanations.insert(key, explanation).await;
    }

    /// Drop every entry, e.g. after swapping artifacts.
    pub fn invalidate_all(&self) {
        self.predictions.invalidate_all();
        self.explanations.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.predictions.entry_count() + self.explanations.entry_count()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
