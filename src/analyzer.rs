//! Stage E: four sequential LLM calls that turn extracted articles into
//! the comparative analysis (spec.md §4.5).
//!
//! Each stage sends one prompt built from the extracted articles and
//! validates the response against that stage's schema. A per-stage
//! retry/backoff loop runs against the current provider before the
//! fallback chain moves to the next provider; stages 1-2 are critical
//! (their exhaustion halts the run) and stages 3-4 are not (their
//! exhaustion substitutes the stage's defined empty payload).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ModelParams;
use crate::error::{BackendError, PipelineError};
use crate::model::{
    duration_ms, Consensus, ContextAndTrust, FactualDisputes, PerspectiveDifferences, ScoredArticle,
    StageOutcome,
};

/// External collaborator: a single LLM call, schema-constrained.
///
/// Implementations own the transport (HTTP client, SDK) behind this call;
/// the analyzer only ever sees a raw JSON response or a [`BackendError`],
/// per the `ModelBackend` contract in spec.md §6.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Name of the provider this backend talks to (e.g. `"openai"`).
    fn provider(&self) -> &str;

    /// Whether this backend is currently usable (e.g. has credentials).
    fn is_available(&self) -> bool;

    /// Generates a response to `prompt`, requesting `model_id` and
    /// constraining output to conform to `schema` (a JSON Schema object).
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        schema: &Value,
        params: &ModelParams,
    ) -> std::result::Result<Value, BackendError>;
}

/// Retry/backoff knobs applied within a single provider before falling
/// back to the next one in the chain.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRetryPolicy {
    /// Maximum attempts against one provider/model pair.
    pub max_attempts: u32,
    /// Base backoff delay before the first retry.
    pub backoff_base: Duration,
    /// Multiplicative backoff factor applied per subsequent retry.
    pub backoff_factor: f64,
}

/// One candidate to try, in fallback order: either a specific model on
/// the primary provider, or a bare provider name from the fallback list
/// (whose backend picks its own default model).
enum Candidate<'a> {
    Model { model_id: &'a str, params: &'a ModelParams },
    ProviderDefault,
}

/// Runs all four analysis stages sequentially against `articles`,
/// producing the full [`crate::model::StagesBlock`] plus the name of the
/// provider the run ultimately settled on.
///
/// # Errors
///
/// Returns [`PipelineError::CriticalAnalysisStageFailed`] if stage 1 or
/// stage 2 exhausts every model and every fallback provider. Stages 3-4
/// never fail the run — exhaustion substitutes
/// `Default::default()` for that stage's payload.
///
/// Returns [`PipelineError::Cancelled`] if `cancel` fires before a stage
/// starts, per spec.md §5. A stage already in flight when cancellation
/// fires is allowed to finish that one backend call rather than being
/// torn down mid-parse; the check happens at each stage boundary and
/// inside the retry backoff, so cancellation is observed within one
/// in-flight call plus backoff, not one full stage.
#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    articles: &[ScoredArticle],
    primary_provider: &dyn ModelBackend,
    fallback_providers: &[Box<dyn ModelBackend>],
    preferred_models: &[crate::config::ModelEntry],
    retry_policy: AnalysisRetryPolicy,
    progress: &crate::progress::ProgressBus,
    cancel: &CancellationToken,
) -> Result<(crate::model::StagesBlock, String), PipelineError> {
    let context = build_article_context(articles);
    let mut settled_provider = primary_provider.provider().to_string();

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    progress.emit(
        "analyzer",
        "stage1",
        crate::progress::StepStatus::Active,
        "context and trust",
    );
    let (stage1, provider1) = run_stage::<ContextAndTrust>(
        1,
        true,
        &stage1_prompt(&context),
        &stage1_schema(),
        primary_provider,
        fallback_providers,
        preferred_models,
        retry_policy,
        cancel,
    )
    .await?;
    settled_provider = provider1.unwrap_or(settled_provider);
    progress.emit(
        "analyzer",
        "stage1",
        crate::progress::StepStatus::Completed,
        "context and trust done",
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    progress.emit("analyzer", "stage2", crate::progress::StepStatus::Active, "consensus");
    let (stage2, provider2) = run_stage::<Consensus>(
        2,
        true,
        &stage2_prompt(&context),
        &stage2_schema(),
        primary_provider,
        fallback_providers,
        preferred_models,
        retry_policy,
        cancel,
    )
    .await?;
    settled_provider = provider2.unwrap_or(settled_provider);
    progress.emit(
        "analyzer",
        "stage2",
        crate::progress::StepStatus::Completed,
        "consensus done",
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    progress.emit(
        "analyzer",
        "stage3",
        crate::progress::StepStatus::Active,
        "factual disputes",
    );
    let (stage3, provider3) = run_stage::<FactualDisputes>(
        3,
        false,
        &stage3_prompt(&context),
        &stage3_schema(),
        primary_provider,
        fallback_providers,
        preferred_models,
        retry_policy,
        cancel,
    )
    .await?;
    settled_provider = provider3.unwrap_or(settled_provider);
    progress.emit(
        "analyzer",
        "stage3",
        crate::progress::StepStatus::Completed,
        "factual disputes done",
    );

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    progress.emit(
        "analyzer",
        "stage4",
        crate::progress::StepStatus::Active,
        "perspective differences",
    );
    let (stage4, provider4) = run_stage::<PerspectiveDifferences>(
        4,
        false,
        &stage4_prompt(&context),
        &stage4_schema(),
        primary_provider,
        fallback_providers,
        preferred_models,
        retry_policy,
        cancel,
    )
    .await?;
    settled_provider = provider4.unwrap_or(settled_provider);
    progress.emit(
        "analyzer",
        "stage4",
        crate::progress::StepStatus::Completed,
        "perspective differences done",
    );

    Ok((
        crate::model::StagesBlock {
            stage1,
            stage2,
            stage3,
            stage4,
        },
        settled_provider,
    ))
}

/// Runs one stage's retry/fallback state machine.
///
/// Tries each model in `preferred_models` against `primary`, each up to
/// `retry_policy.max_attempts` times with exponential backoff, then moves
/// through `fallback_providers` in order (one attempt each, since a
/// fallback provider is already a degraded path). Returns the provider
/// name that ultimately produced the result, if it differs from the
/// caller's current understanding — `None` means the primary provider (at
/// its first model) succeeded outright.
#[allow(clippy::too_many_arguments)]
async fn run_stage<T>(
    stage_id: u8,
    critical: bool,
    prompt: &str,
    schema: &Value,
    primary: &dyn ModelBackend,
    fallback_providers: &[Box<dyn ModelBackend>],
    preferred_models: &[crate::config::ModelEntry],
    retry_policy: AnalysisRetryPolicy,
    cancel: &CancellationToken,
) -> Result<(StageOutcome<T>, Option<String>), PipelineError>
where
    T: DeserializeOwned + Default,
{
    let started = Instant::now();

    let mut candidates: Vec<(&dyn ModelBackend, Candidate<'_>)> = if preferred_models.is_empty() {
        vec![(primary, Candidate::ProviderDefault)]
    } else {
        preferred_models
            .iter()
            .map(|entry| {
                (
                    primary,
                    Candidate::Model {
                        model_id: &entry.model_id,
                        params: &entry.params,
                    },
                )
            })
            .collect()
    };
    for backend in fallback_providers {
        candidates.push((backend.as_ref(), Candidate::ProviderDefault));
    }

    let mut last_error_kind = String::new();
    let mut settled_provider = None;

    for (backend, candidate) in candidates {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !backend.is_available() {
            continue;
        }
        settled_provider = Some(backend.provider().to_string());

        let (model_id, params) = match &candidate {
            Candidate::Model { model_id, params } => ((*model_id).to_string(), (*params).clone()),
            Candidate::ProviderDefault => (String::new(), ModelParams::default()),
        };

        match call_with_retries::<T>(backend, &model_id, prompt, schema, &params, retry_policy, cancel).await {
            Ok(payload) => {
                return Ok((
                    StageOutcome {
                        stage_id,
                        critical,
                        payload,
                        success: true,
                        error_kind: None,
                        duration_ms: duration_ms(started.elapsed()),
                    },
                    settled_provider,
                ));
            }
            Err(kind) => last_error_kind = kind,
        }
    }

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    if critical {
        return Err(PipelineError::CriticalAnalysisStageFailed {
            stage: stage_id,
            message: format!("every provider exhausted; last error: {last_error_kind}"),
        });
    }

    Ok((
        StageOutcome {
            stage_id,
            critical,
            payload: T::default(),
            success: false,
            error_kind: Some(last_error_kind),
            duration_ms: duration_ms(started.elapsed()),
        },
        settled_provider,
    ))
}

/// Calls `backend` up to `retry_policy.max_attempts` times, backing off
/// exponentially between attempts, and parses the response as `T`.
async fn call_with_retries<T>(
    backend: &dyn ModelBackend,
    model_id: &str,
    prompt: &str,
    schema: &Value,
    params: &ModelParams,
    retry_policy: AnalysisRetryPolicy,
    cancel: &CancellationToken,
) -> std::result::Result<T, String>
where
    T: DeserializeOwned,
{
    let mut last_error = String::new();

    for attempt in 0..retry_policy.max_attempts {
        if cancel.is_cancelled() {
            return Err("cancelled".to_string());
        }

        if attempt > 0 {
            let backoff = retry_policy
                .backoff_base
                .mul_f64(retry_policy.backoff_factor.powi(i32::try_from(attempt - 1).unwrap_or(0)));
            tokio::select! {
                () = cancel.cancelled() => return Err("cancelled".to_string()),
                () = tokio::time::sleep(backoff) => {}
            }
        }

        let generated = tokio::select! {
            () = cancel.cancelled() => return Err("cancelled".to_string()),
            result = backend.generate(model_id, prompt, schema, params) => result,
        };

        match generated {
            Ok(value) => match parse_stage_response::<T>(&value) {
                Ok(parsed) => return Ok(parsed),
                Err(message) => {
                    // A schema violation is not retriable within this
                    // provider (spec.md §9) — stop here and let the
                    // fallback chain in `run_stage` advance instead.
                    last_error = message;
                    break;
                }
            },
            Err(err) => {
                last_error = err.to_string();
                if !err.is_retriable() {
                    break;
                }
            }
        }
    }

    Err(last_error)
}

/// Parses a model's JSON response into a stage payload, tolerating the
/// common shapes models actually return: the bare object, or the object
/// wrapped one level deep under a single key.
fn parse_stage_response<T: DeserializeOwned>(value: &Value) -> std::result::Result<T, String> {
    if let Ok(parsed) = serde_json::from_value::<T>(value.clone()) {
        return Ok(parsed);
    }

    if let Value::Object(map) = value {
        for nested in map.values() {
            if let Ok(parsed) = serde_json::from_value::<T>(nested.clone()) {
                return Ok(parsed);
            }
        }
    }

    let preview_len = value.to_string().len().min(200);
    let preview = &value.to_string()[..preview_len];
    Err(format!("response did not match the expected schema, preview: {preview:?}"))
}

/// Renders the extracted articles into a compact, numbered context block
/// shared by all four stage prompts.
fn build_article_context(articles: &[ScoredArticle]) -> String {
    let mut out = String::new();
    for (idx, article) in articles.iter().enumerate() {
        let Some(content) = article.content.as_ref().filter(|c| c.success) else {
            continue;
        };
        out.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            idx + 1,
            article.result.source_name,
            article.result.country_code,
            content.body
        ));
    }
    out
}

const STAGE1_SYSTEM_PROMPT: &str = "You are a news-coverage analyst. Given numbered excerpts from \
multiple outlets covering the same story, summarize the overall story in at most 25 words, judge \
whether outlets broadly agree on the core facts, and suggest a one-sentence reader action. Respond \
with a single JSON object matching the given schema — no prose outside the JSON.";

const STAGE2_SYSTEM_PROMPT: &str = "You are a news-coverage analyst. Given numbered excerpts from \
multiple outlets covering the same story, list up to 4 facts that at least two sources agree on, \
each with the names of the sources confirming it. Respond with a single JSON object matching the \
given schema — no prose outside the JSON.";

const STAGE3_SYSTEM_PROMPT: &str = "You are a news-coverage analyst. Given numbered excerpts from \
multiple outlets covering the same story, identify up to 3 factual claims where sources disagree, \
describing both sides and which sources back each. If sources do not disagree on anything \
material, return an empty list. Respond with a single JSON object matching the given schema — no \
prose outside the JSON.";

const STAGE4_SYSTEM_PROMPT: &str = "You are a news-coverage analyst. Given numbered excerpts from \
multiple outlets covering the same story, identify up to 3 ways groups of sources frame or \
emphasize the story differently (not factual disputes — differences in angle or focus). If \
coverage does not meaningfully diverge, return an empty list. Respond with a single JSON object \
matching the given schema — no prose outside the JSON.";

fn stage1_prompt(context: &str) -> String {
    format!("{STAGE1_SYSTEM_PROMPT}\n\nArticles:\n{context}")
}

fn stage2_prompt(context: &str) -> String {
    format!("{STAGE2_SYSTEM_PROMPT}\n\nArticles:\n{context}")
}

fn stage3_prompt(context: &str) -> String {
    format!("{STAGE3_SYSTEM_PROMPT}\n\nArticles:\n{context}")
}

fn stage4_prompt(context: &str) -> String {
    format!("{STAGE4_SYSTEM_PROMPT}\n\nArticles:\n{context}")
}

fn stage1_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["story_summary", "trust_signal", "reader_action"],
        "properties": {
            "story_summary": { "type": "string" },
            "trust_signal": {
                "type": "string",
                "enum": ["high_agreement", "some_conflicts", "major_disputes"]
            },
            "reader_action": { "type": "string" }
        }
    })
}

fn stage2_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["consensus"],
        "properties": {
            "consensus": {
                "type": "array",
                "maxItems": 4,
                "items": {
                    "type": "object",
                    "required": ["fact", "sources"],
                    "properties": {
                        "fact": { "type": "string" },
                        "sources": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

fn stage3_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["factual_disputes"],
        "properties": {
            "factual_disputes": {
                "type": "array",
                "maxItems": 3,
                "items": {
                    "type": "object",
                    "required": ["what", "claim_a", "claim_b", "sources_a", "sources_b"],
                    "properties": {
                        "what": { "type": "string" },
                        "claim_a": { "type": "string" },
                        "claim_b": { "type": "string" },
                        "sources_a": { "type": "array", "items": { "type": "string" } },
                        "sources_b": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

fn stage4_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["coverage_angles"],
        "properties": {
            "coverage_angles": {
                "type": "array",
                "maxItems": 3,
                "items": {
                    "type": "object",
                    "required": ["angle", "group1", "group1_sources", "group2", "group2_sources"],
                    "properties": {
                        "angle": { "type": "string" },
                        "group1": { "type": "string" },
                        "group1_sources": { "type": "array", "items": { "type": "string" } },
                        "group2": { "type": "string" },
                        "group2_sources": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn article_with_body(body: &str) -> ScoredArticle {
        ScoredArticle::with_content(
            SearchResult {
                country_code: "us".into(),
                language: "en".into(),
                url: "https://a".into(),
                raw_title: "Headline - Source".into(),
                source_name: "Source".into(),
                published_at_ms: None,
                snippet: None,
                feed_order: 0,
            },
            crate::model::ExtractedContent {
                final_url: "https://a".into(),
                body: body.to_string(),
                excerpt: None,
                byline: None,
                detected_language: Some("en".into()),
                extraction_method: "readability".into(),
                duration_ms: 10,
                success: true,
                error_kind: None,
                quality: None,
            },
        )
    }

    fn retry_policy() -> AnalysisRetryPolicy {
        AnalysisRetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_factor: 2.0,
        }
    }

    struct AlwaysSucceeds {
        name: &'static str,
    }

    #[async_trait]
    impl ModelBackend for AlwaysSucceeds {
        fn provider(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn generate(
            &self,
            _model_id: &str,
            _prompt: &str,
            _schema: &Value,
            _params: &ModelParams,
        ) -> std::result::Result<Value, BackendError> {
            Ok(serde_json::json!({
                "story_summary": "summary",
                "trust_signal": "high_agreement",
                "reader_action": "read widely",
                "consensus": [],
                "factual_disputes": [],
                "coverage_angles": []
            }))
        }
    }

    struct AlwaysFails {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for AlwaysFails {
        fn provider(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn generate(
            &self,
            _model_id: &str,
            _prompt: &str,
            _schema: &Value,
            _params: &ModelParams,
        ) -> std::result::Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::ServerError {
                provider: self.name.to_string(),
                message: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn all_four_stages_succeed_against_the_primary() {
        let primary = AlwaysSucceeds { name: "primary" };
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let (stages, provider) = analyze(
            &[article_with_body("some article body text")],
            &primary,
            &[],
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
        assert!(stages.stage1.success);
        assert!(stages.stage2.success);
        assert_eq!(provider, "primary");
    }

    #[tokio::test]
    async fn critical_stage_failure_halts_with_no_fallback() {
        let primary = AlwaysFails {
            name: "primary",
            calls: AtomicUsize::new(0),
        };
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let err = analyze(
            &[article_with_body("body")],
            &primary,
            &[],
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "critical_analysis_stage_failed");
    }

    #[tokio::test]
    async fn critical_stage_falls_back_to_next_provider() {
        let primary = AlwaysFails {
            name: "primary",
            calls: AtomicUsize::new(0),
        };
        let fallback: Vec<Box<dyn ModelBackend>> = vec![Box::new(AlwaysSucceeds { name: "fallback" })];
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let (stages, provider) = analyze(
            &[article_with_body("body")],
            &primary,
            &fallback,
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
        assert!(stages.stage1.success);
        assert_eq!(provider, "fallback");
    }

    struct ReturnsMalformedJson {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for ReturnsMalformedJson {
        fn provider(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn generate(
            &self,
            _model_id: &str,
            _prompt: &str,
            _schema: &Value,
            _params: &ModelParams,
        ) -> std::result::Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "unexpected_shape": true }))
        }
    }

    #[tokio::test]
    async fn schema_violation_is_not_retried_within_the_same_provider() {
        let primary = ReturnsMalformedJson {
            name: "primary",
            calls: AtomicUsize::new(0),
        };
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let _ = analyze(
            &[article_with_body("body")],
            &primary,
            &[],
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await;
        // Exactly one call for stage 1 despite `retry_policy().max_attempts == 2`:
        // a schema violation terminates the provider's attempt immediately
        // rather than retrying against the same provider.
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn schema_violation_still_falls_back_to_the_next_provider() {
        let primary = ReturnsMalformedJson {
            name: "primary",
            calls: AtomicUsize::new(0),
        };
        let fallback: Vec<Box<dyn ModelBackend>> = vec![Box::new(AlwaysSucceeds { name: "fallback" })];
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let (stages, provider) = analyze(
            &[article_with_body("body")],
            &primary,
            &fallback,
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
        assert!(stages.stage1.success);
        assert_eq!(provider, "fallback");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_critical_stage_failure_substitutes_empty_payload() {
        struct Stage1AndStage2OnlySucceeds;

        #[async_trait]
        impl ModelBackend for Stage1AndStage2OnlySucceeds {
            fn provider(&self) -> &str {
                "mixed"
            }
            fn is_available(&self) -> bool {
                true
            }
            async fn generate(
                &self,
                _model_id: &str,
                prompt: &str,
                _schema: &Value,
                _params: &ModelParams,
            ) -> std::result::Result<Value, BackendError> {
                if prompt.contains("factual claims where sources disagree")
                    || prompt.contains("ways groups of sources frame")
                {
                    return Err(BackendError::ServerError {
                        provider: "mixed".to_string(),
                        message: "down".to_string(),
                    });
                }
                Ok(serde_json::json!({
                    "story_summary": "summary",
                    "trust_signal": "high_agreement",
                    "reader_action": "read widely",
                    "consensus": []
                }))
            }
        }

        let primary = Stage1AndStage2OnlySucceeds;
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let (stages, _provider) = analyze(
            &[article_with_body("body")],
            &primary,
            &[],
            &[],
            retry_policy(),
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
        assert!(stages.stage1.success);
        assert!(stages.stage2.success);
        assert!(!stages.stage3.success);
        assert!(stages.stage3.payload.factual_disputes.is_empty());
        assert!(!stages.stage4.success);
    }

    #[test]
    fn parse_stage_response_accepts_wrapped_payload() {
        let value = serde_json::json!({ "result": { "consensus": [] } });
        let parsed: Consensus = parse_stage_response(&value).unwrap_or_else(|_| unreachable!());
        assert!(parsed.consensus.is_empty());
    }

    #[test]
    fn parse_stage_response_rejects_unmatched_shape() {
        let value = serde_json::json!({ "unexpected": true });
        let result: std::result::Result<Consensus, String> = parse_stage_response(&value);
        assert!(result.is_err());
    }

    #[test]
    fn build_article_context_skips_failed_extractions() {
        let failed = ScoredArticle::with_content(
            SearchResult {
                country_code: "gb".into(),
                language: "en".into(),
                url: "https://b".into(),
                raw_title: "Other - Source".into(),
                source_name: "Source".into(),
                published_at_ms: None,
                snippet: None,
                feed_order: 1,
            },
            crate::model::ExtractedContent {
                final_url: "https://b".into(),
                body: String::new(),
                excerpt: None,
                byline: None,
                detected_language: None,
                extraction_method: "none".into(),
                duration_ms: 5,
                success: false,
                error_kind: Some("extraction_timeout".into()),
                quality: None,
            },
        );
        let ok = article_with_body("included text");
        let context = build_article_context(&[ok, failed]);
        assert!(context.contains("included text"));
        assert_eq!(context.matches('[').count(), 1);
    }

    #[tokio::test]
    async fn cancellation_before_analyze_is_observed_promptly() {
        let primary = AlwaysSucceeds { name: "primary" };
        let (bus, _rx) = crate::progress::ProgressBus::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = analyze(
            &[article_with_body("body")],
            &primary,
            &[],
            &[],
            retry_policy(),
            &bus,
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
