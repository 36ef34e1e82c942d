//! Pipeline configuration: a single typed, immutable config built once per
//! `Analyze()` call.
//!
//! Resolved in order: explicit builder values → environment variables →
//! named defaults, mirroring the teacher's `AgentConfig`. `build()` runs
//! every `validation.*` gate from spec.md §6 and returns every problem it
//! finds rather than failing on the first one.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::{CountrySpec, QualityThresholds, SelectionTargets};

/// Default per-country search timeout, in milliseconds (spec.md §4.2).
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;
/// Default per-country search retry attempts (spec.md §4.2).
pub const DEFAULT_SEARCH_RETRY_ATTEMPTS: u32 = 2;
/// Default per-item extraction timeout, in milliseconds (spec.md §4.4).
pub const DEFAULT_EXTRACTION_TIMEOUT_MS: u64 = 15_000;
/// Default extraction batch size (spec.md §4.4).
pub const DEFAULT_EXTRACTION_BATCH_SIZE: usize = 5;
/// Default analysis retry attempts per provider (spec.md §4.5).
pub const DEFAULT_ANALYSIS_RETRY_ATTEMPTS: u32 = 2;
/// Default analysis backoff base delay, in milliseconds (spec.md §4.5).
pub const DEFAULT_ANALYSIS_BACKOFF_BASE_MS: u64 = 1_000;
/// Default analysis backoff multiplicative factor (spec.md §4.5).
pub const DEFAULT_ANALYSIS_BACKOFF_FACTOR: f64 = 2.0;
/// Default per-country selection target, applied to every configured
/// country unless overridden with [`PipelineConfigBuilder::country_count`]
/// (spec.md §4.3).
pub const DEFAULT_PER_COUNTRY: usize = 3;
/// Default per-country selection buffer (spec.md §4.3).
pub const DEFAULT_BUFFER_PER_COUNTRY: usize = 2;
/// Default cap on candidates handed to the Extractor (spec.md §4.3).
pub const DEFAULT_MAX_FOR_ANALYSIS: usize = 12;
/// Default language-detection confidence floor (spec.md §4.1).
pub const DEFAULT_LANGUAGE_CONFIDENCE_FLOOR: f32 = 0.6;

/// Per-model generation knobs, passed through to the backend uninterpreted
/// (spec.md §4.5 — "advertise per-model knobs ... passed through
/// uninterpreted").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelParams {
    /// Sampling temperature, if the backend supports it.
    pub temperature: Option<f32>,
    /// Top-k sampling cutoff, if the backend supports it.
    pub top_k: Option<u32>,
    /// Top-p (nucleus) sampling cutoff, if the backend supports it.
    pub top_p: Option<f32>,
    /// Reasoning/"thinking" token budget, if the backend supports it.
    pub thinking_budget: Option<u32>,
}

/// One entry in the ordered model-id list, paired with its per-model
/// params.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    /// Model identifier as understood by the backend.
    pub model_id: String,
    /// Generation parameters for this model.
    pub params: ModelParams,
}

/// Fully resolved, immutable configuration for one `Analyze()` run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Countries to search, in the order search results should be
    /// interleaved.
    pub countries: Vec<CountrySpec>,
    /// Selector sizing targets.
    pub selection: SelectionTargets,
    /// Per-country search timeout.
    pub search_timeout: Duration,
    /// Per-country search retry attempts.
    pub search_retry_attempts: u32,
    /// Per-item extraction timeout.
    pub extraction_timeout: Duration,
    /// Extractor batch size (max in-flight fetches).
    pub extraction_batch_size: usize,
    /// Whether to retry low-quality extractions once with a fresh fetch.
    pub retry_low_quality: bool,
    /// Validation/scoring thresholds for extracted content.
    pub quality_thresholds: QualityThresholds,
    /// Name of the primary model provider.
    pub model_provider: String,
    /// Ordered list of models to try within the primary provider before
    /// falling through to the next provider in `fallback_providers`.
    pub preferred_models: Vec<ModelEntry>,
    /// Ordered provider names to fall back through after
    /// `model_provider`'s models are exhausted.
    pub fallback_providers: Vec<String>,
    /// Retry attempts per provider for a single stage call.
    pub analysis_retry_attempts: u32,
    /// Base backoff delay before the first retry.
    pub analysis_backoff_base: Duration,
    /// Multiplicative backoff factor applied per subsequent retry.
    pub analysis_backoff_factor: f64,
    /// Compression level hint passed through to the backend
    /// uninterpreted (spec.md §6).
    pub compression_level: Option<String>,
    /// Confidence floor below which QueryPlanner falls back to the
    /// script-range heuristic.
    pub language_confidence_floor: f32,
}

/// One problem found while validating a [`PipelineConfigBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Name of the field the issue concerns.
    pub field: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    countries: Vec<CountrySpec>,
    default_per_country: Option<usize>,
    country_overrides: BTreeMap<String, usize>,
    buffer_per_country: Option<usize>,
    max_for_analysis: Option<usize>,
    search_timeout_ms: Option<u64>,
    search_retry_attempts: Option<u32>,
    extraction_timeout_ms: Option<u64>,
    extraction_batch_size: Option<usize>,
    retry_low_quality: Option<bool>,
    quality_thresholds: Option<QualityThresholds>,
    model_provider: Option<String>,
    preferred_models: Vec<ModelEntry>,
    fallback_providers: Vec<String>,
    analysis_retry_attempts: Option<u32>,
    analysis_backoff_base_ms: Option<u64>,
    analysis_backoff_factor: Option<f64>,
    compression_level: Option<String>,
    language_confidence_floor: Option<f32>,
}

impl PipelineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Builds a config from environment variables layered over defaults.
    ///
    /// Countries and preferred models have no sensible environment
    /// encoding here and must still be set on the returned builder before
    /// calling `build()`.
    #[must_use]
    pub fn from_env() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default().from_env()
    }
}

impl PipelineConfigBuilder {
    /// Populates unset scalar fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.search_timeout_ms.is_none() {
            self.search_timeout_ms = std::env::var("NEWSBROKER_SEARCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.search_retry_attempts.is_none() {
            self.search_retry_attempts = std::env::var("NEWSBROKER_SEARCH_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.extraction_timeout_ms.is_none() {
            self.extraction_timeout_ms = std::env::var("NEWSBROKER_EXTRACTION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.extraction_batch_size.is_none() {
            self.extraction_batch_size = std::env::var("NEWSBROKER_EXTRACTION_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.default_per_country.is_none() {
            self.default_per_country = std::env::var("NEWSBROKER_PER_COUNTRY")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.model_provider.is_none() {
            self.model_provider = std::env::var("NEWSBROKER_MODEL_PROVIDER").ok();
        }
        self
    }

    /// Sets the country catalog for this run.
    #[must_use]
    pub fn countries(mut self, countries: Vec<CountrySpec>) -> Self {
        self.countries = countries;
        self
    }

    /// Sets the default per-country selection target, applied to every
    /// configured country that has no explicit [`Self::country_count`]
    /// override.
    #[must_use]
    pub const fn default_per_country(mut self, n: usize) -> Self {
        self.default_per_country = Some(n);
        self
    }

    /// Overrides the selection target for one specific country code,
    /// taking precedence over [`Self::default_per_country`].
    #[must_use]
    pub fn country_count(mut self, code: impl Into<String>, n: usize) -> Self {
        self.country_overrides.insert(code.into(), n);
        self
    }

    /// Sets the per-country selection buffer.
    #[must_use]
    pub const fn buffer_per_country(mut self, n: usize) -> Self {
        self.buffer_per_country = Some(n);
        self
    }

    /// Sets the cap on candidates handed to the Extractor.
    #[must_use]
    pub const fn max_for_analysis(mut self, n: usize) -> Self {
        self.max_for_analysis = Some(n);
        self
    }

    /// Sets the per-country search timeout.
    #[must_use]
    pub fn search_timeout(mut self, duration: Duration) -> Self {
        self.search_timeout_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the per-country search retry attempts.
    #[must_use]
    pub const fn search_retry_attempts(mut self, n: u32) -> Self {
        self.search_retry_attempts = Some(n);
        self
    }

    /// Sets the per-item extraction timeout.
    #[must_use]
    pub fn extraction_timeout(mut self, duration: Duration) -> Self {
        self.extraction_timeout_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the extractor batch size.
    #[must_use]
    pub const fn extraction_batch_size(mut self, n: usize) -> Self {
        self.extraction_batch_size = Some(n);
        self
    }

    /// Sets whether low-quality extractions are retried once.
    #[must_use]
    pub const fn retry_low_quality(mut self, retry: bool) -> Self {
        self.retry_low_quality = Some(retry);
        self
    }

    /// Sets the extraction quality thresholds, overriding
    /// [`QualityThresholds::default`].
    #[must_use]
    pub const fn quality_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.quality_thresholds = Some(thresholds);
        self
    }

    /// Sets the primary model provider name.
    #[must_use]
    pub fn model_provider(mut self, provider: impl Into<String>) -> Self {
        self.model_provider = Some(provider.into());
        self
    }

    /// Sets the ordered list of preferred models within the primary
    /// provider.
    #[must_use]
    pub fn preferred_models(mut self, models: Vec<ModelEntry>) -> Self {
        self.preferred_models = models;
        self
    }

    /// Sets the ordered fallback provider list.
    #[must_use]
    pub fn fallback_providers(mut self, providers: Vec<String>) -> Self {
        self.fallback_providers = providers;
        self
    }

    /// Sets the per-provider analysis retry attempts.
    #[must_use]
    pub const fn analysis_retry_attempts(mut self, n: u32) -> Self {
        self.analysis_retry_attempts = Some(n);
        self
    }

    /// Sets the analysis backoff base delay.
    #[must_use]
    pub fn analysis_backoff_base(mut self, duration: Duration) -> Self {
        self.analysis_backoff_base_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the analysis backoff multiplicative factor.
    #[must_use]
    pub const fn analysis_backoff_factor(mut self, factor: f64) -> Self {
        self.analysis_backoff_factor = Some(factor);
        self
    }

    /// Sets the compression-level hint passed through to the backend.
    #[must_use]
    pub fn compression_level(mut self, level: impl Into<String>) -> Self {
        self.compression_level = Some(level.into());
        self
    }

    /// Sets the language-detection confidence floor.
    #[must_use]
    pub const fn language_confidence_floor(mut self, floor: f32) -> Self {
        self.language_confidence_floor = Some(floor);
        self
    }

    /// Validates every gate and, if none failed, builds the config.
    ///
    /// # Errors
    ///
    /// Returns every validation issue found, not just the first — per the
    /// "config validation yields issue list" redesign note in spec.md §9.
    pub fn build(self) -> std::result::Result<PipelineConfig, Vec<ConfigIssue>> {
        let mut issues = Vec::new();

        if self.countries.is_empty() {
            issues.push(ConfigIssue {
                field: "countries",
                message: "at least one country must be configured".to_string(),
            });
        }

        for code in self.country_overrides.keys() {
            if !self.countries.iter().any(|c| &c.code == code) {
                issues.push(ConfigIssue {
                    field: "country_overrides",
                    message: format!("override given for {code}, which is not in `countries`"),
                });
            }
        }

        let default_per_country = self.default_per_country.unwrap_or(DEFAULT_PER_COUNTRY);
        let buffer_per_country = self.buffer_per_country.unwrap_or(DEFAULT_BUFFER_PER_COUNTRY);
        let max_for_analysis = self.max_for_analysis.unwrap_or(DEFAULT_MAX_FOR_ANALYSIS);
        if max_for_analysis == 0 {
            issues.push(ConfigIssue {
                field: "max_for_analysis",
                message: "must be greater than zero".to_string(),
            });
        }

        let extraction_batch_size = self
            .extraction_batch_size
            .unwrap_or(DEFAULT_EXTRACTION_BATCH_SIZE);
        if extraction_batch_size == 0 {
            issues.push(ConfigIssue {
                field: "extraction_batch_size",
                message: "must be greater than zero".to_string(),
            });
        }

        let quality_thresholds = self.quality_thresholds.unwrap_or_default();
        if !(0.0..=100.0).contains(&quality_thresholds.min_quality_score) {
            issues.push(ConfigIssue {
                field: "quality_thresholds.min_quality_score",
                message: "must be within [0, 100]".to_string(),
            });
        }

        let analysis_backoff_factor = self
            .analysis_backoff_factor
            .unwrap_or(DEFAULT_ANALYSIS_BACKOFF_FACTOR);
        if analysis_backoff_factor < 1.0 {
            issues.push(ConfigIssue {
                field: "analysis_backoff_factor",
                message: "must be at least 1.0".to_string(),
            });
        }

        let language_confidence_floor = self
            .language_confidence_floor
            .unwrap_or(DEFAULT_LANGUAGE_CONFIDENCE_FLOOR);
        if !(0.0..=1.0).contains(&language_confidence_floor) {
            issues.push(ConfigIssue {
                field: "language_confidence_floor",
                message: "must be within [0, 1]".to_string(),
            });
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        let per_country: BTreeMap<String, usize> = self
            .countries
            .iter()
            .map(|c| {
                let count = self
                    .country_overrides
                    .get(&c.code)
                    .copied()
                    .unwrap_or(default_per_country);
                (c.code.clone(), count)
            })
            .collect();

        Ok(PipelineConfig {
            countries: self.countries,
            selection: SelectionTargets {
                per_country,
                buffer_per_country,
                max_for_analysis,
            },
            search_timeout: Duration::from_millis(
                self.search_timeout_ms.unwrap_or(DEFAULT_SEARCH_TIMEOUT_MS),
            ),
            search_retry_attempts: self
                .search_retry_attempts
                .unwrap_or(DEFAULT_SEARCH_RETRY_ATTEMPTS),
            extraction_timeout: Duration::from_millis(
                self.extraction_timeout_ms
                    .unwrap_or(DEFAULT_EXTRACTION_TIMEOUT_MS),
            ),
            extraction_batch_size,
            retry_low_quality: self.retry_low_quality.unwrap_or(true),
            quality_thresholds,
            model_provider: self.model_provider.unwrap_or_else(|| "default".to_string()),
            preferred_models: self.preferred_models,
            fallback_providers: self.fallback_providers,
            analysis_retry_attempts: self
                .analysis_retry_attempts
                .unwrap_or(DEFAULT_ANALYSIS_RETRY_ATTEMPTS),
            analysis_backoff_base: Duration::from_millis(
                self.analysis_backoff_base_ms
                    .unwrap_or(DEFAULT_ANALYSIS_BACKOFF_BASE_MS),
            ),
            analysis_backoff_factor,
            compression_level: self.compression_level,
            language_confidence_floor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_country() -> Vec<CountrySpec> {
        vec![CountrySpec {
            code: "us".into(),
            display_name: "United States".into(),
            search_language: "en".into(),
            ui_group: None,
        }]
    }

    fn two_countries() -> Vec<CountrySpec> {
        vec![
            CountrySpec {
                code: "us".into(),
                display_name: "United States".into(),
                search_language: "en".into(),
                ui_group: None,
            },
            CountrySpec {
                code: "jp".into(),
                display_name: "Japan".into(),
                search_language: "ja".into(),
                ui_group: None,
            },
        ]
    }

    #[test]
    fn builder_defaults() {
        let config = PipelineConfig::builder()
            .countries(one_country())
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.selection.per_country.get("us"), Some(&DEFAULT_PER_COUNTRY));
        assert_eq!(config.search_retry_attempts, DEFAULT_SEARCH_RETRY_ATTEMPTS);
        assert_eq!(config.model_provider, "default");
    }

    #[test]
    fn builder_missing_countries_is_an_issue() {
        let result = PipelineConfig::builder().build();
        assert!(result.is_err());
        let issues = result.unwrap_err();
        assert!(issues.iter().any(|i| i.field == "countries"));
    }

    #[test]
    fn builder_collects_multiple_issues_at_once() {
        let result = PipelineConfig::builder()
            .max_for_analysis(0)
            .quality_thresholds(QualityThresholds {
                min_quality_score: 150.0,
                ..QualityThresholds::default()
            })
            .build();
        let issues = result.unwrap_err();
        assert!(issues.len() >= 3);
        assert!(issues.iter().any(|i| i.field == "countries"));
        assert!(issues.iter().any(|i| i.field == "max_for_analysis"));
        assert!(issues
            .iter()
            .any(|i| i.field == "quality_thresholds.min_quality_score"));
    }

    #[test]
    fn builder_default_applies_to_every_country() {
        let config = PipelineConfig::builder()
            .countries(two_countries())
            .default_per_country(5)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.selection.per_country.get("us"), Some(&5));
        assert_eq!(config.selection.per_country.get("jp"), Some(&5));
    }

    #[test]
    fn country_override_takes_precedence_over_default() {
        let config = PipelineConfig::builder()
            .countries(two_countries())
            .default_per_country(3)
            .country_count("jp", 1)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.selection.per_country.get("us"), Some(&3));
        assert_eq!(config.selection.per_country.get("jp"), Some(&1));
    }

    #[test]
    fn override_for_unknown_country_is_an_issue() {
        let result = PipelineConfig::builder()
            .countries(one_country())
            .country_count("fr", 2)
            .build();
        let issues = result.unwrap_err();
        assert!(issues.iter().any(|i| i.field == "country_overrides"));
    }

    #[test]
    fn builder_custom_values() {
        let config = PipelineConfig::builder()
            .countries(one_country())
            .default_per_country(5)
            .extraction_batch_size(10)
            .analysis_retry_attempts(3)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.selection.per_country.get("us"), Some(&5));
        assert_eq!(config.extraction_batch_size, 10);
        assert_eq!(config.analysis_retry_attempts, 3);
    }
}
