//! `newsbroker-demo`: a thin harness that drives one [`analyze`] call
//! end to end.
//!
//! This binary carries no business logic of its own — it wires up
//! demo/in-memory implementations of the pipeline's external
//! collaborators (spec.md §6) and prints the resulting
//! [`AnalysisArtifact`] as JSON. A real embedding application would
//! replace the demo `SearchClient`/`ContentFetcher`/`LanguageDetector`/
//! `Translator` with ones backed by an actual syndicated-search API and
//! browser-integration layer; only the `ModelBackend` here
//! (`OpenAiBackend`) talks to a real external service, and only when
//! `OPENAI_API_KEY` is set.

// This binary's whole job is to print the resulting artifact; the
// library itself never does this (`print_stdout` stays denied there).
#![allow(clippy::print_stdout)]

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use newsbroker_core::analyzer::ModelBackend;
use newsbroker_core::backends::OpenAiBackend;
use newsbroker_core::cache::NoopResultCache;
use newsbroker_core::config::{ModelEntry, ModelParams, PipelineConfig};
use newsbroker_core::dispatcher::SearchClient;
use newsbroker_core::error::BackendError;
use newsbroker_core::extractor::ContentFetcher;
use newsbroker_core::feed;
use newsbroker_core::model::{ArticleInput, CountrySpec, ExtractedContent};
use newsbroker_core::pipeline::{self, PipelineBackends};
use newsbroker_core::progress::ProgressEvent;
use newsbroker_core::query_planner::{self, Confidence, LanguageDetector, Translator};

/// Runs the comparative news-analysis pipeline once, for one article.
#[derive(Parser, Debug)]
#[command(name = "newsbroker-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Absolute URL of the input article.
    #[arg(long)]
    url: String,

    /// Title of the input article.
    #[arg(long)]
    title: String,

    /// Declared language of the input article (ISO 639-1), if known.
    #[arg(long)]
    declared_language: Option<String>,

    /// Comma-separated country codes to search (ISO 3166-1 alpha-2).
    #[arg(long, default_value = "us,gb,jp,br")]
    countries: String,

    /// Requested article count per country.
    #[arg(long, default_value_t = 3)]
    per_country: usize,

    /// Hard cap on articles handed to the Analyzer.
    #[arg(long, default_value_t = 10)]
    max_for_analysis: usize,

    /// `OpenAI`-compatible model id to request, when `OPENAI_API_KEY` is
    /// set.
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// Log verbosity filter (passed through to `RUST_LOG` semantics),
    /// used only when `RUST_LOG` itself is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let countries = country_catalog(&cli.countries);

    let config = PipelineConfig::builder()
        .countries(countries)
        .default_per_country(cli.per_country)
        .max_for_analysis(cli.max_for_analysis)
        .model_provider("openai")
        .preferred_models(vec![ModelEntry {
            model_id: cli.model.clone(),
            params: ModelParams {
                temperature: Some(0.2),
                ..ModelParams::default()
            },
        }])
        .build()
        .map_err(|issues| {
            anyhow::anyhow!(
                "invalid configuration: {}",
                issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            )
        })?;

    let primary_model: Arc<dyn ModelBackend> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            Arc::new(OpenAiBackend::new("openai", &key, cli.model.clone(), None))
        }
        _ => {
            tracing::warn!("OPENAI_API_KEY not set; using a canned demo model backend");
            Arc::new(CannedModelBackend)
        }
    };

    let backends = PipelineBackends {
        language_detector: Arc::new(HeuristicLanguageDetector),
        translator: Arc::new(PassthroughTranslator),
        search_client: Arc::new(DemoSearchClient),
        content_fetcher: Arc::new(DemoContentFetcher),
        primary_model,
        fallback_models: vec![Box::new(CannedModelBackend)],
        cache: Arc::new(NoopResultCache),
    };

    let input = ArticleInput {
        url: cli.url,
        title: cli.title,
        source: None,
        language: cli.declared_language,
    };

    let (progress, mut progress_rx) = newsbroker_core::progress::ProgressBus::new();
    let listener = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            log_progress(&event);
        }
    });

    let cancel = CancellationToken::new();
    let artifact = pipeline::analyze(&input, &config, &backends, &progress, &cancel).await;
    drop(progress);
    let _ = listener.await;

    match artifact {
        Ok(artifact) => {
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!(kind = err.kind(), %err, "analysis failed");
            Err(anyhow::anyhow!(err))
        }
    }
}

fn init_logging(default_level: &str) {
    use tracing_subscriber::fmt::time::UtcTime;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn log_progress(event: &ProgressEvent) {
    tracing::info!(
        stage = %event.stage_id,
        step = %event.step,
        status = ?event.status,
        percent = ?event.percent,
        "{}",
        event.message
    );
}

/// Built-in demo country catalog, filtered to the codes the caller asked
/// for. A real embedding application supplies its own catalog per
/// spec.md §9's "single `CountrySpec` catalog provided at call time".
fn country_catalog(requested: &str) -> Vec<CountrySpec> {
    let known = [
        ("us", "United States", "en"),
        ("gb", "United Kingdom", "en"),
        ("br", "Brazil", "pt"),
        ("jp", "Japan", "ja"),
        ("de", "Germany", "de"),
        ("fr", "France", "fr"),
        ("in", "India", "en"),
        ("ru", "Russia", "ru"),
    ];

    requested
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .filter_map(|code| {
            known.iter().find(|(known_code, _, _)| *known_code == code).map(
                |(code, display_name, language)| CountrySpec {
                    code: (*code).to_string(),
                    display_name: (*display_name).to_string(),
                    search_language: (*language).to_string(),
                    ui_group: None,
                },
            )
        })
        .collect()
}

/// Falls back to the script-range heuristic unconditionally; a real
/// embedding application would call an actual language-detection
/// service and only fall back locally on low confidence, per spec.md
/// §4.1.
struct HeuristicLanguageDetector;

#[async_trait]
impl LanguageDetector for HeuristicLanguageDetector {
    async fn detect(&self, text: &str) -> std::result::Result<(String, Confidence), String> {
        query_planner::script_range_heuristic(text)
            .map(|lang| (lang.to_string(), 1.0))
            .ok_or_else(|| "no recognizable script in title".to_string())
    }
}

/// Stands in for a real translation service: returns the input text
/// unchanged. A caller wiring up a production deployment of this crate
/// replaces this with an actual `Translator`.
struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str, _source_language: &str) -> std::result::Result<String, String> {
        Ok(text.to_string())
    }
}

/// Demo `SearchClient`: synthesizes a small feed per country rather than
/// calling a real syndicated-search endpoint (browser/network
/// integration is explicitly out of core scope, per spec.md §1).
struct DemoSearchClient;

#[async_trait]
impl SearchClient for DemoSearchClient {
    async fn search(
        &self,
        query: &str,
        country: &CountrySpec,
        max_results: usize,
    ) -> std::result::Result<Vec<newsbroker_core::model::SearchResult>, String> {
        let feed_xml = synthesize_feed(query, &country.code);
        let items = feed::parse_items(&feed_xml);
        let mut results = feed::to_search_results(&items, &country.code, &country.search_language);
        results.truncate(max_results);
        Ok(results)
    }
}

fn synthesize_feed(query: &str, country_code: &str) -> String {
    let mut xml = String::from("<rss><channel>\n");
    for i in 1..=5 {
        xml.push_str(&format!(
            "<item><title><![CDATA[{query} — {country_code} angle {i} - Demo Outlet {country_code}{i}]]></title>\
             <link><![CDATA[https://demo.example/{country_code}/{i}]]></link>\
             <description><![CDATA[Demo coverage of \"{query}\" from outlet {i} in {country_code}.]]></description></item>\n"
        ));
    }
    xml.push_str("</channel></rss>\n");
    xml
}

/// Demo `ContentFetcher`: synthesizes plausible article bodies from the
/// URL instead of actually fetching and cleaning a page. Exists purely
/// so the demo binary can drive a full pipeline run without the
/// browser-integration layer spec.md §1 puts out of core scope.
struct DemoContentFetcher;

#[async_trait]
impl ContentFetcher for DemoContentFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<ExtractedContent, String> {
        let body = format!(
            "Demo article body for {url}. ".repeat(250)
        );
        Ok(ExtractedContent {
            final_url: url.to_string(),
            body,
            excerpt: Some("Demo excerpt summarizing the synthesized article.".to_string()),
            byline: None,
            detected_language: Some("en".to_string()),
            extraction_method: "demo_synthetic".to_string(),
            duration_ms: 5,
            success: true,
            error_kind: None,
            quality: None,
        })
    }
}

/// Demo `ModelBackend`: produces schema-valid but canned payloads,
/// so the pipeline can run end to end without an API key. Never
/// reports itself unavailable, so it also serves as the fallback
/// backend if the real `OpenAiBackend` exhausts its retries.
struct CannedModelBackend;

#[async_trait]
impl ModelBackend for CannedModelBackend {
    fn provider(&self) -> &str {
        "canned-demo"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _model_id: &str,
        _prompt: &str,
        _schema: &serde_json::Value,
        _params: &ModelParams,
    ) -> std::result::Result<serde_json::Value, BackendError> {
        Ok(serde_json::json!({
            "story_summary": "Outlets broadly agree on the core event; details vary by region.",
            "trust_signal": "some_conflicts",
            "reader_action": "Compare two sources before forming a final view.",
            "consensus": [
                { "fact": "The event described in the headline occurred.", "sources": ["Demo Outlet 1", "Demo Outlet 2"] }
            ],
            "factual_disputes": [],
            "coverage_angles": []
        }))
    }
}
