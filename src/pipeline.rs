//! Top-level orchestration: `Analyze()` (spec.md §4/§5/§6).
//!
//! Runs the five stages strictly in sequence — QueryPlanner, Dispatcher,
//! Selector, Extractor, Analyzer — threading one cancellation token and
//! one [`ProgressBus`] through all of them, and stamping per-stage wall
//! clock timing into the returned [`AnalysisArtifact`].

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::analyzer::{self, AnalysisRetryPolicy, ModelBackend};
use crate::cache::ResultCache;
use crate::config::PipelineConfig;
use crate::dispatcher::{self, CountryOutcome, RetryPolicy, SearchClient};
use crate::error::{PipelineError, Result};
use crate::extractor::{self, ContentFetcher, FetchSession};
use crate::model::{
    duration_ms, AnalysisArtifact, AnalysisMetadata, ArticleInput, ArticleInputEcho, QueryEcho, SearchResult,
};
use crate::progress::{ProgressBus, StepStatus};
use crate::query_planner::{self, LanguageDetector, Translator};

/// The external collaborators `Analyze()` needs, bundled so a caller
/// configures them once per process rather than per call.
pub struct PipelineBackends {
    /// Detects the input title's language (Stage A).
    pub language_detector: Arc<dyn LanguageDetector>,
    /// Translates non-English titles to English (Stage A).
    pub translator: Arc<dyn Translator>,
    /// Runs per-country searches (Stage B).
    pub search_client: Arc<dyn SearchClient>,
    /// Fetches and cleans article content (Stage D).
    pub content_fetcher: Arc<dyn ContentFetcher>,
    /// Primary LLM backend (Stage E).
    pub primary_model: Arc<dyn ModelBackend>,
    /// Fallback LLM backends, tried in order after `primary_model` and its
    /// preferred models are exhausted.
    pub fallback_models: Vec<Box<dyn ModelBackend>>,
    /// Optional cache consulted before running and populated after a
    /// successful run. Defaults to [`crate::cache::NoopResultCache`].
    pub cache: Arc<dyn ResultCache>,
}

/// Runs the full comparative-analysis pipeline for one article.
///
/// Consults `backends.cache` under `input.url` before doing any work, and
/// populates it after a successful run. Every stage observes `cancel`
/// between steps and, where a suspension point would otherwise block
/// indefinitely, races that point against `cancel.cancelled()` as well
/// (spec.md §5).
///
/// # Errors
///
/// Returns whichever [`PipelineError`] the first failing stage produces.
/// Critical failures propagate as-is; see each stage module for which of
/// its failure modes are critical versus advisory.
pub async fn analyze(
    input: &ArticleInput,
    config: &PipelineConfig,
    backends: &PipelineBackends,
    progress: &ProgressBus,
    cancel: &CancellationToken,
) -> Result<AnalysisArtifact> {
    let run_started = Instant::now();

    if let Some(cached) = backends.cache.get(&input.url).await {
        progress.emit("pipeline", "cache", StepStatus::Completed, "served from cache");
        return Ok(cached);
    }

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Stage A: plan the search query from the input title.
    progress.emit("query_planner", "plan", StepStatus::Active, "planning query");
    let plan = query_planner::plan_query(
        &input.title,
        backends.language_detector.as_ref(),
        backends.translator.as_ref(),
        config.language_confidence_floor,
    )
    .await?;
    progress.emit("query_planner", "plan", StepStatus::Completed, "query planned");

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Stage B: dispatch the planned query to every configured country.
    progress.emit("dispatcher", "search", StepStatus::Active, "dispatching search");
    let dispatch_started = Instant::now();
    let country_outcomes = dispatcher::dispatch(
        &plan.search_text,
        &config.countries,
        &config.selection,
        Arc::clone(&backends.search_client),
        RetryPolicy {
            max_attempts: config.search_retry_attempts,
            timeout: config.search_timeout,
        },
        cancel,
    )
    .await?;
    let hits: Vec<SearchResult> = country_outcomes
        .into_iter()
        .filter_map(|(_, outcome)| match outcome {
            CountryOutcome::Ok(results) => Some(results),
            CountryOutcome::Failed(_) => None,
        })
        .flatten()
        .collect();
    let dispatch_ms = duration_ms(dispatch_started.elapsed());
    progress.emit(
        "dispatcher",
        "search",
        StepStatus::Completed,
        format!("{} hits in {dispatch_ms}ms", hits.len()),
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Stage C: dedupe, rank, and trim to a bounded candidate set.
    progress.emit("selector", "select", StepStatus::Active, "selecting candidates");
    let (candidates, coverage_advisory) =
        crate::selector::select(hits, &input.url, &input.title, &config.selection);
    if let Some(advisory) = &coverage_advisory {
        tracing::warn!(reason = %advisory, "selection produced less coverage than requested");
    }
    let candidates_selected = candidates.len();
    progress.emit(
        "selector",
        "select",
        StepStatus::Completed,
        format!("{candidates_selected} candidates selected"),
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Stage D: fetch and clean content for every selected candidate.
    progress.emit("extractor", "extract", StepStatus::Active, "extracting content");
    let session = FetchSession::new(Arc::clone(&backends.content_fetcher));
    let extracted = extractor::extract(
        candidates,
        &session,
        config.extraction_batch_size,
        config.extraction_timeout,
        config.retry_low_quality,
        config.quality_thresholds,
        cancel,
    )
    .await?;
    drop(session);
    let articles_analyzed = extracted.iter().filter(|a| a.extraction_succeeded()).count();
    progress.emit(
        "extractor",
        "extract",
        StepStatus::Completed,
        format!("{articles_analyzed} of {candidates_selected} extractions succeeded"),
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Stage E: run the four sequential analysis stages.
    let (stages, model_provider) = analyzer::analyze(
        &extracted,
        backends.primary_model.as_ref(),
        &backends.fallback_models,
        &config.preferred_models,
        AnalysisRetryPolicy {
            max_attempts: config.analysis_retry_attempts,
            backoff_base: config.analysis_backoff_base,
            backoff_factor: config.analysis_backoff_factor,
        },
        progress,
        cancel,
    )
    .await?;

    let stage_durations_ms = [
        stages.stage1.duration_ms,
        stages.stage2.duration_ms,
        stages.stage3.duration_ms,
        stages.stage4.duration_ms,
    ];

    let artifact = AnalysisArtifact {
        input: ArticleInputEcho::from(input),
        query: QueryEcho {
            search_text: plan.search_text,
            detected_language: plan.detected_source_language,
            was_translated: plan.was_translated,
        },
        articles: extracted,
        stages,
        metadata: AnalysisMetadata {
            model_provider,
            articles_analyzed,
            articles_input: candidates_selected,
            total_duration_ms: duration_ms(run_started.elapsed()),
            stage_durations_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    };

    backends.cache.put(&input.url, &artifact).await;

    Ok(artifact)
}
