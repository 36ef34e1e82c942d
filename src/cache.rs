//! Optional result cache for repeat `Analyze()` calls on the same input.
//!
//! Not part of the distilled pipeline description, but every stage of this
//! crate already treats its external collaborators as swappable traits;
//! a cache is the same idea applied to the whole pipeline's output, so a
//! caller can skip a full run when nothing about the input has changed.
//! The pipeline itself never requires one — [`NoopResultCache`] is the
//! default and makes every call a cache miss.

use async_trait::async_trait;

use crate::model::AnalysisArtifact;

/// Pluggable cache for full pipeline results, keyed by whatever the
/// caller considers identifying (e.g. the input URL, or a hash of the
/// input plus the config that produced the result).
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Looks up a previously cached artifact for `key`.
    async fn get(&self, key: &str) -> Option<AnalysisArtifact>;

    /// Stores `artifact` under `key`, replacing any prior entry.
    async fn put(&self, key: &str, artifact: &AnalysisArtifact);
}

/// A cache that never holds anything: every `get` misses, every `put` is
/// a no-op. Used when the caller has not configured a real cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResultCache;

#[async_trait]
impl ResultCache for NoopResultCache {
    async fn get(&self, _key: &str) -> Option<AnalysisArtifact> {
        None
    }

    async fn put(&self, _key: &str, _artifact: &AnalysisArtifact) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ArticleInputEcho, Consensus, ContextAndTrust, FactualDisputes, PerspectiveDifferences, QueryEcho,
        StageOutcome, StagesBlock,
    };

    fn sample_artifact() -> AnalysisArtifact {
        AnalysisArtifact {
            input: ArticleInputEcho {
                url: "https://example.com/a".to_string(),
                title: "Headline".to_string(),
                source: None,
                language: None,
            },
            query: QueryEcho {
                search_text: "Headline".to_string(),
                detected_language: Some("en".to_string()),
                was_translated: false,
            },
            articles: Vec::new(),
            stages: StagesBlock {
                stage1: StageOutcome {
                    stage_id: 1,
                    critical: true,
                    payload: ContextAndTrust::default(),
                    success: true,
                    error_kind: None,
                    duration_ms: 10,
                },
                stage2: StageOutcome {
                    stage_id: 2,
                    critical: true,
                    payload: Consensus::default(),
                    success: true,
                    error_kind: None,
                    duration_ms: 10,
                },
                stage3: StageOutcome {
                    stage_id: 3,
                    critical: false,
                    payload: FactualDisputes::default(),
                    success: true,
                    error_kind: None,
                    duration_ms: 10,
                },
                stage4: StageOutcome {
                    stage_id: 4,
                    critical: false,
                    payload: PerspectiveDifferences::default(),
                    success: true,
                    error_kind: None,
                    duration_ms: 10,
                },
            },
            metadata: crate::model::AnalysisMetadata {
                model_provider: "test".to_string(),
                articles_analyzed: 0,
                articles_input: 0,
                total_duration_ms: 0,
                stage_durations_ms: [10, 10, 10, 10],
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn noop_cache_always_misses() {
        let cache = NoopResultCache;
        cache.put("key", &sample_artifact()).await;
        assert!(cache.get("key").await.is_none());
    }
}
