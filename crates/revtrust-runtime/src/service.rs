//! Scoring service: the engine behind a timeout, a cache and a worker pool.
//!
//! Inference is CPU-bound, so every request that misses the cache runs on
//! tokio's blocking pool, one task per scoring path. The timeout covers
//! queueing and inference; a request that exceeds it is reported as
//! `Timeout` and its worker results are discarded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use revtrust_core::{
    narrate, EnsembleResult, Explanation, ModelScore, ReviewText, TrustEngine, TrustReport,
};

use crate::cache::{CacheKey, ResultCache};
use crate::config::RuntimeConfig;
use crate::stats::{LatencySnapshot, LatencyStats, Operation};
use crate::RuntimeError;

/// A fused verdict with service metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReview {
    #[serde(flatten)]
    pub result: EnsembleResult,

    pub scored_at: DateTime<Utc>,

    /// Served from the cache rather than recomputed
    pub cached: bool,
}

/// Async seam over anything that can score reviews.
#[async_trait]
pub trait ReviewScorer: Send + Sync {
    async fn predict(&self, text: &str) -> Result<ScoredReview, RuntimeError>;

    async fn explain(&self, text: &str, top_n: usize) -> Result<Explanation, RuntimeError>;
}

/// Score many reviews with at most `max_concurrency` in flight.
///
/// Results come back in input order, one per text. A failure on one text
/// does not affect the others.
pub async fn score_batch<S>(
    scorer: &S,
    texts: &[String],
    max_concurrency: usize,
) -> Vec<Result<ScoredReview, RuntimeError>>
where
    S: ReviewScorer + ?Sized,
{
    stream::iter(texts.iter().map(|text| scorer.predict(text)))
        .buffered(max_concurrency.max(1))
        .collect()
        .await
}

/// Long-lived service around a shared engine.
pub struct ScoringService {
    engine: Arc<TrustEngine>,
    cache: Option<ResultCache>,
    stats: LatencyStats,
    request_timeout: Duration,
    top_n: usize,
    max_concurrency: usize,
}

impl ScoringService {
    pub fn new(engine: TrustEngine, config: &RuntimeConfig) -> Self {
        Self::with_shared_engine(Arc::new(engine), config)
    }

    /// Build a service over an engine that is also used elsewhere.
    pub fn with_shared_engine(engine: Arc<TrustEngine>, config: &RuntimeConfig) -> Self {
        let cache = (config.cache.max_entries > 0)
            .then(|| ResultCache::new(config.cache.max_entries, config.cache.ttl));

        Self {
            engine,
            cache,
            stats: LatencyStats::new(),
            request_timeout: config.request_timeout,
            top_n: config.scoring.top_n,
            max_concurrency: config.max_concurrency,
        }
    }

    pub fn engine(&self) -> &Arc<TrustEngine> {
        &self.engine
    }

    /// Configured contributor count for explanations.
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn latency(&self, operation: Operation) -> LatencySnapshot {
        self.stats.snapshot(operation)
    }

    pub async fn predict(&self, text: &str) -> Result<ScoredReview, RuntimeError> {
        let review = ReviewText::new(text)?;
        let key = CacheKey::prediction(review.as_str());

        if let Some(cache) = &self.cache {
            if let Some(result) = cache.get_prediction(&key).await {
                tracing::debug!("Prediction served from cache");
                return Ok(ScoredReview {
                    result,
                    scored_at: Utc::now(),
                    cached: true,
                });
            }
        }

        let result = self
            .timed(Operation::Predict, self.score_paths(review))
            .await?;
        tracing::debug!(
            label = %result.label,
            trust_score = result.trust_score,
            "Review scored"
        );

        if let Some(cache) = &self.cache {
            cache.insert_prediction(key, result.clone()).await;
        }

        Ok(ScoredReview {
            result,
            scored_at: Utc::now(),
            cached: false,
        })
    }

    pub async fn explain(&self, text: &str, top_n: usize) -> Result<Explanation, RuntimeError> {
        let review = ReviewText::new(text)?;
        let key = CacheKey::explanation(review.as_str(), top_n);

        if let Some(cache) = &self.cache {
            if let Some(explanation) = cache.get_explanation(&key).await {
                tracing::debug!("Explanation served from cache");
                return Ok(explanation);
            }
        }

        let engine = Arc::clone(&self.engine);
        let work = async move {
            tokio::task::spawn_blocking(move || engine.explain(review.as_str(), top_n))
                .await
                .map_err(|e| RuntimeError::Join(e.to_string()))?
                .map_err(RuntimeError::from)
        };
        let explanation = self.timed(Operation::Explain, work).await?;

        if let Some(cache) = &self.cache {
            cache.insert_explanation(key, explanation.clone()).await;
        }

        Ok(explanation)
    }

    /// Verdict, contributors and narrative.
    pub async fn report(&self, text: &str, top_n: usize) -> Result<TrustReport, RuntimeError> {
        let scored = self.predict(text).await?;
        let explanation = self.explain(text, top_n).await?;
        let narrative = narrate(&scored.result, &explanation);

        Ok(TrustReport {
            result: scored.result,
            explanation,
            narrative,
        })
    }

    /// Score many reviews with the configured concurrency.
    pub async fn predict_batch(&self, texts: &[String]) -> Vec<Result<ScoredReview, RuntimeError>> {
        let started = Instant::now();
        let results = score_batch(self, texts, self.max_concurrency).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(
            total = texts.len(),
            failed,
            elapsed = ?started.elapsed(),
            "Batch scored"
        );
        results
    }

    /// Run every scoring path on its own worker and fuse in path order.
    ///
    /// Readiness is checked first so a missing artifact fails the request
    /// before any model runs.
    async fn score_paths(&self, review: ReviewText) -> Result<EnsembleResult, RuntimeError> {
        self.engine.ensure_scorers_ready()?;

        let review = Arc::new(review);
        let tasks = self.engine.scorers().iter().map(|scorer| {
            let scorer = Arc::clone(scorer);
            let review = Arc::clone(&review);
            tokio::task::spawn_blocking(move || {
                scorer
                    .score(&review)
                    .map(|score| ModelScore::new(scorer.kind(), score))
            })
        });

        let constituents = futures::future::try_join_all(tasks)
            .await
            .map_err(|e| RuntimeError::Join(e.to_string()))?
            .into_iter()
            .collect::<revtrust_core::Result<Vec<_>>>()?;

        Ok(self.engine.fuse(constituents)?)
    }

    /// Apply the request timeout and record latency.
    async fn timed<T, F>(&self, operation: Operation, work: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation = %operation,
                    timeout = ?self.request_timeout,
                    "Request timed out"
                );
                Err(RuntimeError::Timeout(self.request_timeout))
            }
        };

        let elapsed = started.elapsed();
        self.stats.record(operation, elapsed);
        if let Err(e) = &outcome {
            tracing::debug!(operation = %operation, error = %e, ?elapsed, "Request failed");
        }
        outcome
    }
}

#[async_trait]
impl ReviewScorer for ScoringService {
    async fn predict(&self, text: &str) -> Result<ScoredReview, RuntimeError> {
        ScoringService::predict(self, text).await
    }

    async fn explain(&self, text: &str, top_n: usize) -> Result<Explanation, RuntimeError> {
        ScoringService::explain(self, text, top_n).await
    }
}
