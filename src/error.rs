//! Error taxonomy for the analysis pipeline.
//!
//! One variant per stage failure mode. Each variant carries the context a
//! caller needs to decide whether to retry, surface to a user, or treat as
//! a partial result.

use thiserror::Error;

/// Errors from a [`crate::analyzer::ModelBackend`] implementation.
///
/// Backends never panic or throw; every failure mode is one of these
/// kinds so the analyzer's retry/fallback state machine can make the
/// same decision regardless of which backend raised it.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Provider-side rate limiting. Retriable with backoff.
    #[error("rate limited by {provider}: {message}")]
    Rate {
        /// Backend/provider name.
        provider: String,
        /// Raw message from the provider, if any.
        message: String,
    },
    /// Transport-level failure (connection reset, DNS, etc). Retriable.
    #[error("network error talking to {provider}: {message}")]
    Network {
        /// Backend/provider name.
        provider: String,
        /// Raw message from the provider, if any.
        message: String,
    },
    /// Invalid or missing credentials. Not retriable.
    #[error("authentication failed for {provider}: {message}")]
    Auth {
        /// Backend/provider name.
        provider: String,
        /// Raw message from the provider, if any.
        message: String,
    },
    /// Malformed request (HTTP 4xx other than 429). Not retriable.
    #[error("invalid request to {provider}: {message}")]
    InvalidRequest {
        /// Backend/provider name.
        provider: String,
        /// Raw message from the provider, if any.
        message: String,
    },
    /// Provider-side failure (HTTP 5xx). Retriable.
    #[error("server error from {provider}: {message}")]
    ServerError {
        /// Backend/provider name.
        provider: String,
        /// Raw message from the provider, if any.
        message: String,
    },
    /// Response did not conform to the requested schema. Not retriable
    /// within the same provider, but the fallback chain still applies.
    #[error("response from {provider} did not match the requested schema: {message}")]
    SchemaMismatch {
        /// Backend/provider name.
        provider: String,
        /// Description of the mismatch.
        message: String,
    },
    /// The call did not complete before its deadline. Retriable.
    #[error("call to {provider} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Backend/provider name.
        provider: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },
}

impl BackendError {
    /// Whether a caller should attempt another try against the same
    /// provider (as opposed to immediately falling back).
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Rate { .. } | Self::Network { .. } | Self::ServerError { .. } | Self::Timeout { .. }
        )
    }

    /// The provider name this error originated from.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Rate { provider, .. }
            | Self::Network { provider, .. }
            | Self::Auth { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::ServerError { provider, .. }
            | Self::SchemaMismatch { provider, .. }
            | Self::Timeout { provider, .. } => provider,
        }
    }
}

/// Top-level pipeline error, matching the taxonomy in spec.md §7.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Article title was empty or whitespace-only.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what was invalid.
        message: String,
    },

    /// Language detection failed and no fallback heuristic could recover.
    #[error("language detection failed: {message}")]
    LanguageDetectionFailed {
        /// Underlying collaborator failure message.
        message: String,
    },

    /// Translation to English failed (non-fatal; QueryPlanner degrades
    /// gracefully, so this variant is informational/diagnostic only and
    /// is not expected to terminate a run by itself).
    #[error("translation failed: {message}")]
    TranslationFailed {
        /// Underlying collaborator failure message.
        message: String,
    },

    /// A single country's search attempt failed but may succeed on retry.
    #[error("transient search failure for country {country}: {message}")]
    SearchTransient {
        /// Country code.
        country: String,
        /// Underlying failure message.
        message: String,
    },

    /// A single country's search attempt failed and retries were
    /// exhausted or the failure was judged non-retriable.
    #[error("permanent search failure for country {country}: {message}")]
    SearchPermanent {
        /// Country code.
        country: String,
        /// Underlying failure message.
        message: String,
    },

    /// Every configured country returned zero results.
    #[error("no search results from any of {attempted} configured countries")]
    NoSearchResults {
        /// Number of countries attempted.
        attempted: usize,
    },

    /// Selection produced fewer candidates than ideal, but the pipeline
    /// continues (advisory, not fatal).
    #[error("insufficient coverage: {available} candidates available across {countries} countries")]
    InsufficientCoverage {
        /// Candidates actually available after dedupe/filtering.
        available: usize,
        /// Distinct countries represented.
        countries: usize,
    },

    /// A single extraction attempt exceeded its timeout.
    #[error("extraction timed out for {url} after {timeout_ms}ms")]
    ExtractionTimeout {
        /// URL being extracted.
        url: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// A single extraction attempt failed for a reason other than timeout.
    #[error("extraction failed for {url}: {message}")]
    ExtractionFailed {
        /// URL being extracted.
        url: String,
        /// Underlying failure message.
        message: String,
    },

    /// Fewer than two articles were successfully extracted; halts the
    /// pipeline before the Analyzer stage runs.
    #[error("insufficient extracted content: only {succeeded} of {attempted} extractions succeeded")]
    InsufficientExtractedContent {
        /// Number of successful extractions.
        succeeded: usize,
        /// Number of extraction attempts made.
        attempted: usize,
    },

    /// The configured model backend is not usable right now.
    #[error("backend {provider} unavailable: {reason}")]
    BackendUnavailable {
        /// Backend/provider name.
        provider: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Authentication failed against every provider in the fallback list.
    #[error("backend authentication failed for {provider}: {message}")]
    BackendAuth {
        /// Backend/provider name.
        provider: String,
        /// Underlying message.
        message: String,
    },

    /// Rate limiting persisted past the retry budget.
    #[error("backend rate limit exceeded for {provider} after {attempts} attempts")]
    BackendRate {
        /// Backend/provider name.
        provider: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Network failures persisted past the retry budget.
    #[error("backend network failure for {provider} after {attempts} attempts: {message}")]
    BackendNetwork {
        /// Backend/provider name.
        provider: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Underlying message.
        message: String,
    },

    /// Server-side failures persisted past the retry budget.
    #[error("backend server error for {provider} after {attempts} attempts: {message}")]
    BackendServer {
        /// Backend/provider name.
        provider: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Underlying message.
        message: String,
    },

    /// The backend call did not complete within its deadline, retries
    /// exhausted.
    #[error("backend timeout for {provider} after {attempts} attempts")]
    BackendTimeout {
        /// Backend/provider name.
        provider: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A stage's response violated its declared schema and no provider in
    /// the fallback list produced a conforming response.
    #[error("model response for stage {stage} violated its schema: {message}")]
    ModelSchemaViolation {
        /// Stage identifier (1-4).
        stage: u8,
        /// Description of the violation.
        message: String,
    },

    /// A stage's response could not be parsed as JSON at all.
    #[error("model response for stage {stage} was not valid JSON: {message}")]
    ModelJsonParse {
        /// Stage identifier (1-4).
        stage: u8,
        /// Parser diagnostic.
        message: String,
    },

    /// A critical analysis stage failed after exhausting retries and the
    /// full provider fallback list. Halts the pipeline.
    #[error("critical analysis stage {stage} failed: {message}")]
    CriticalAnalysisStageFailed {
        /// Stage identifier (1 or 2; the two critical stages).
        stage: u8,
        /// Underlying failure message.
        message: String,
    },

    /// The caller's cancellation token fired.
    #[error("analysis cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short machine-readable kind tag, stable across message wording
    /// changes, for callers that want to match on category rather than
    /// the full enum.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::LanguageDetectionFailed { .. } => "language_detection_failed",
            Self::TranslationFailed { .. } => "translation_failed",
            Self::SearchTransient { .. } => "search_transient",
            Self::SearchPermanent { .. } => "search_permanent",
            Self::NoSearchResults { .. } => "no_search_results",
            Self::InsufficientCoverage { .. } => "insufficient_coverage",
            Self::ExtractionTimeout { .. } => "extraction_timeout",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::InsufficientExtractedContent { .. } => "insufficient_extracted_content",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendAuth { .. } => "backend_auth",
            Self::BackendRate { .. } => "backend_rate",
            Self::BackendNetwork { .. } => "backend_network",
            Self::BackendServer { .. } => "backend_server",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::ModelSchemaViolation { .. } => "model_schema_violation",
            Self::ModelJsonParse { .. } => "model_json_parse",
            Self::CriticalAnalysisStageFailed { .. } => "critical_analysis_stage_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Convenience alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
