//! Stage D: fetches and cleans article content for selected candidates
//! (spec.md §4.4).
//!
//! Bounded-concurrency fan-out, mirroring the orchestrator's subcall
//! batching: a `Semaphore` caps in-flight fetches regardless of how many
//! candidates were selected, and each permit is released automatically
//! when its guard drops, on every exit path including a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::model::{compute_quality_score, ExtractedContent, QualityThresholds, ScoredArticle};

/// External collaborator: fetches and extracts one article's content.
///
/// A `ContentFetcher` implementation owns whatever connection pool or
/// session state it needs; [`FetchSession`] below is the scope this
/// trait's caller uses to guarantee that state is released.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches `url` and returns cleaned article content. Implementations
    /// report failures through `ExtractedContent::success = false` and
    /// `error_kind`, or by returning `Err` for transport-level failures
    /// the caller should treat as retriable.
    async fn fetch(&self, url: &str) -> std::result::Result<ExtractedContent, String>;
}

/// A scoped handle to whatever resources a [`ContentFetcher`] needs for
/// the duration of one extraction run (e.g. an HTTP client, a connection
/// pool checkout). Always released on drop, regardless of which fetch
/// outcome — success, failure, or timeout — ended the run.
pub struct FetchSession {
    fetcher: Arc<dyn ContentFetcher>,
}

impl FetchSession {
    /// Opens a session backed by `fetcher`.
    #[must_use]
    pub const fn new(fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { fetcher }
    }

    fn fetcher(&self) -> Arc<dyn ContentFetcher> {
        Arc::clone(&self.fetcher)
    }
}

/// Extracts content for every candidate, batching fetches so at most
/// `batch_size` run concurrently.
///
/// Every candidate comes back as a [`ScoredArticle::with_content`] value,
/// success or failure alike — the pipeline carries failed extractions
/// forward as records rather than dropping them, per spec.md §3. When
/// `thresholds.min_quality_score` is not met by a successful first
/// attempt, one retry fetch is made and the higher-scoring attempt kept,
/// per spec.md §4.4.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientExtractedContent`] if fewer than
/// two extractions succeed. Returns [`PipelineError::Cancelled`] promptly
/// if `cancel` fires before any fetch has completed, per spec.md §5;
/// fetches already in flight are not aborted but `extract` stops waiting
/// on them once cancellation is observed. Otherwise returns one
/// [`ScoredArticle`] per candidate, in the same order as `candidates`.
pub async fn extract(
    candidates: Vec<ScoredArticle>,
    session: &FetchSession,
    batch_size: usize,
    item_timeout: Duration,
    retry_low_quality: bool,
    thresholds: QualityThresholds,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredArticle>, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let attempted = candidates.len();
    let semaphore = Arc::new(Semaphore::new(batch_size.max(1)));
    let mut handles = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let semaphore = Arc::clone(&semaphore);
        let fetcher = session.fetcher();
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let content = fetch_with_retry(
                &*fetcher,
                &candidate.result.url,
                item_timeout,
                retry_low_quality,
                thresholds,
                &cancel,
            )
            .await;
            ScoredArticle::with_content(candidate.result, content)
        });
        handles.push(handle);
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        tokio::select! {
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = handle => if let Ok(article) = joined {
                results.push(article);
            },
        }
    }

    let succeeded = results.iter().filter(|article| article.extraction_succeeded()).count();

    if succeeded < 2 {
        return Err(PipelineError::InsufficientExtractedContent { succeeded, attempted });
    }

    Ok(results)
}

async fn fetch_with_retry(
    fetcher: &dyn ContentFetcher,
    url: &str,
    item_timeout: Duration,
    retry_low_quality: bool,
    thresholds: QualityThresholds,
    cancel: &CancellationToken,
) -> ExtractedContent {
    let first = fetch_once(fetcher, url, item_timeout, thresholds, cancel).await;

    let is_low_quality =
        first.success && compute_quality_score(&first) < f64::from(thresholds.min_quality_score);
    if !retry_low_quality || !is_low_quality || cancel.is_cancelled() {
        return first;
    }

    let retry = fetch_once(fetcher, url, item_timeout, thresholds, cancel).await;
    if retry.success && compute_quality_score(&retry) > compute_quality_score(&first) {
        retry
    } else {
        first
    }
}

async fn fetch_once(
    fetcher: &dyn ContentFetcher,
    url: &str,
    item_timeout: Duration,
    thresholds: QualityThresholds,
    cancel: &CancellationToken,
) -> ExtractedContent {
    let started = Instant::now();
    let attempt = tokio::select! {
        () = cancel.cancelled() => {
            return failed_content(url, "cancelled", "analysis cancelled", started.elapsed());
        }
        result = timeout(item_timeout, fetcher.fetch(url)) => result,
    };
    match attempt {
        Ok(Ok(content)) => apply_validation_gates(content, thresholds),
        Ok(Err(message)) => failed_content(url, "extraction_failed", &message, started.elapsed()),
        Err(_elapsed) => failed_content(
            url,
            "extraction_timeout",
            &format!("timed out after {}ms", item_timeout.as_millis()),
            started.elapsed(),
        ),
    }
}

/// Enforces the `validation.*` gates spec.md §6 says run "before
/// Analyzer": a fetch the `ContentFetcher` reported as successful is
/// downgraded to a failure if its body falls outside the configured
/// content-length/word-count bounds. This is what makes
/// [`ExtractedContent::success`] actually imply the minimum-body-length
/// invariant spec.md §3 describes, rather than just trusting whatever
/// the collaborator reported.
fn apply_validation_gates(content: ExtractedContent, thresholds: QualityThresholds) -> ExtractedContent {
    if !content.success {
        return content;
    }

    let body_len = content.body.len();
    let word_count = content.word_count();

    let violation = if body_len < thresholds.min_content_length {
        Some("below_min_content")
    } else if body_len > thresholds.max_content_length {
        Some("above_max_content")
    } else if word_count < thresholds.min_word_count {
        Some("below_min_word_count")
    } else {
        None
    };

    let Some(error_kind) = violation else {
        return content;
    };

    tracing::debug!(
        url = %content.final_url,
        error_kind,
        body_len,
        word_count,
        "extracted content failed validation gate"
    );
    ExtractedContent {
        success: false,
        error_kind: Some(error_kind.to_string()),
        ..content
    }
}

fn failed_content(url: &str, error_kind: &str, message: &str, elapsed: Duration) -> ExtractedContent {
    tracing::debug!(url, error_kind, message, "extraction attempt failed");
    ExtractedContent {
        final_url: url.to_string(),
        body: String::new(),
        excerpt: None,
        byline: None,
        detected_language: None,
        extraction_method: "none".to_string(),
        duration_ms: crate::model::duration_ms(elapsed),
        success: false,
        error_kind: Some(error_kind.to_string()),
        quality: None,
    }
}
