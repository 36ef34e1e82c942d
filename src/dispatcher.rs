//! Stage B: dispatches a search query to every configured country
//! concurrently (spec.md §4.2).
//!
//! One task per country, fanned out with `tokio::spawn` rather than a
//! bounded semaphore — the country count is small and caller-controlled,
//! so there is no need to throttle concurrency here the way the Extractor
//! must throttle URL fetches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::model::{CountrySpec, SearchResult, SelectionTargets};

/// External collaborator: runs a single country's search.
///
/// Implementations own the transport (HTTP client, feed parsing) behind
/// this call; the core only ever sees parsed [`SearchResult`]s, per the
/// `SearchClient` contract in spec.md §6.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Searches for `query` scoped to `country` and `language`, returning
    /// at most `max_results` raw feed hits in feed order.
    async fn search(
        &self,
        query: &str,
        country: &CountrySpec,
        max_results: usize,
    ) -> std::result::Result<Vec<SearchResult>, String>;
}

/// Retry/backoff knobs for one country's search attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

/// Outcome of dispatching to a single country.
#[derive(Debug, Clone)]
pub enum CountryOutcome {
    /// The country returned results (possibly empty).
    Ok(Vec<SearchResult>),
    /// All attempts failed; the pipeline continues with other countries.
    Failed(PipelineError),
}

/// Dispatches `query` to every country in `countries` concurrently, each
/// retried up to `policy.max_attempts` times with exponential backoff.
/// Countries with a requested count of zero in `targets.per_country` are
/// skipped entirely, per spec.md §8's boundary case.
///
/// Each country task requests at most `requested + bufferPerCountry`
/// items, per spec.md §4.2, so over-fetching a feed never leaks past the
/// Selector with more slack than configured.
///
/// # Errors
///
/// Returns [`PipelineError::NoSearchResults`] only if every queried
/// country failed or returned zero results; otherwise returns `Ok` with
/// one [`CountryOutcome`] per queried country (in the same order as
/// `countries`), so callers can see which countries degraded.
///
/// Returns [`PipelineError::Cancelled`] promptly if `cancel` fires before
/// any country has produced a result, per spec.md §5. Countries already
/// mid-attempt when cancellation fires are not aborted — their spawned
/// tasks keep running, bounded by `policy.timeout`, but `dispatch` stops
/// waiting on them.
pub async fn dispatch(
    query: &str,
    countries: &[CountrySpec],
    targets: &SelectionTargets,
    client: Arc<dyn SearchClient>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<(CountrySpec, CountryOutcome)>, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let query = Arc::new(query.to_string());
    let queried: Vec<&CountrySpec> = countries
        .iter()
        .filter(|c| targets.per_country.get(&c.code).copied().unwrap_or(0) > 0)
        .collect();
    let mut handles = Vec::with_capacity(queried.len());

    for country in queried {
        let client = Arc::clone(&client);
        let query = Arc::clone(&query);
        let country = country.clone();
        let requested = targets.per_country.get(&country.code).copied().unwrap_or(0);
        let max_results = requested + targets.buffer_per_country;
        let cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let outcome = search_with_retry(&client, &query, &country, max_results, policy, &cancel).await;
            (country, outcome)
        });
        handles.push(handle);
    }

    let attempted = handles.len();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        tokio::select! {
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = handle => match joined {
                Ok((country, outcome)) => results.push((country, outcome)),
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "dispatcher task panicked");
                }
            },
        }
    }

    let any_results = results.iter().any(|(_, outcome)| {
        matches!(outcome, CountryOutcome::Ok(hits) if !hits.is_empty())
    });

    if !any_results {
        return Err(PipelineError::NoSearchResults { attempted });
    }

    Ok(results)
}

async fn search_with_retry(
    client: &Arc<dyn SearchClient>,
    query: &str,
    country: &CountrySpec,
    max_results: usize,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> CountryOutcome {
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return CountryOutcome::Failed(PipelineError::Cancelled);
        }

        if attempt > 0 {
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
            tokio::select! {
                () = cancel.cancelled() => return CountryOutcome::Failed(PipelineError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }

        let attempt_result = tokio::select! {
            () = cancel.cancelled() => return CountryOutcome::Failed(PipelineError::Cancelled),
            result = timeout(policy.timeout, client.search(query, country, max_results)) => result,
        };

        match attempt_result {
            Ok(Ok(hits)) => {
                tracing::debug!(country = %country.code, hits = hits.len(), "search succeeded");
                return CountryOutcome::Ok(hits);
            }
            Ok(Err(message)) => {
                tracing::debug!(country = %country.code, attempt, %message, "search attempt failed");
                last_error = message;
            }
            Err(_elapsed) => {
                tracing::debug!(country = %country.code, attempt, "search attempt timed out");
                last_error = format!("timed out after {}ms", policy.timeout.as_millis());
            }
        }
    }

    CountryOutcome::Failed(PipelineError::SearchPermanent {
        country: country.code.clone(),
        message: last_error,
    })
}
