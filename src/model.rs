//! Data model shared across pipeline stages.
//!
//! Each stage consumes the previous stage's output and produces the next
//! stage's input; nothing here is mutated concurrently by more than one
//! stage at a time (see spec §5 — stages run strictly sequentially).

use serde::{Deserialize, Serialize};

/// One country to search in, as supplied by the caller at call time.
///
/// The catalog of `CountrySpec`s is provided per call rather than looked
/// up from a built-in table, so there is exactly one source of country
/// codes and no risk of the `zh-CN` vs `zh` duplication spec.md §9 flags
/// as a bug in the original design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySpec {
    /// ISO 3166-1 alpha-2 country code used to scope the search
    /// (e.g. `"us"`, `"gb"`, `"jp"`).
    pub code: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Language the search feed for this country should be queried in
    /// (ISO 639-1, e.g. `"en"`, `"ja"`).
    pub search_language: String,
    /// Free-form hint an external UI layer can use to group countries
    /// (e.g. a region name). The core never interprets this value.
    pub ui_group: Option<String>,
}

/// Caller-controlled sizing for the Selector stage (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTargets {
    /// Requested article count, keyed by country code. Every key must
    /// appear in the `CountrySpec` catalog passed alongside it.
    pub per_country: std::collections::BTreeMap<String, usize>,
    /// Extra buffer above each country's requested count, fetched to
    /// absorb extraction failures.
    pub buffer_per_country: usize,
    /// Hard cap on how many candidates are handed to the Extractor.
    pub max_for_analysis: usize,
}

impl SelectionTargets {
    /// Sum of every country's requested count (before the buffer).
    #[must_use]
    pub fn total_requested(&self) -> usize {
        self.per_country.values().sum()
    }
}

/// One raw hit from a country's search, before dedup/selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Country this result was retrieved for.
    pub country_code: String,
    /// Language the search was issued in for this country.
    pub language: String,
    /// Canonical article URL.
    pub url: String,
    /// Raw title as returned by the feed.
    pub raw_title: String,
    /// Source name, extracted from the suffix after the last `" - "` in
    /// `raw_title`, or `"Unknown"` if no such suffix is present.
    pub source_name: String,
    /// Publication timestamp, milliseconds since the Unix epoch, if the
    /// feed provided one.
    pub published_at_ms: Option<u64>,
    /// Optional short snippet/summary from the feed.
    pub snippet: Option<String>,
    /// Position in the feed's own ordering (0 = first), used as the
    /// quality tiebreaker when no extracted content is available yet.
    pub feed_order: usize,
}

impl SearchResult {
    /// Derives `source_name` from a raw feed title: the text after the
    /// last `" - "` separator, or `"Unknown"` when absent.
    #[must_use]
    pub fn derive_source_name(raw_title: &str) -> String {
        raw_title
            .rsplit_once(" - ")
            .map(|(_, suffix)| suffix.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// The result of attempting to fetch one article's content (spec.md §3).
///
/// Invariant: when `success` is `true`, `body.len()` is at least the
/// caller's configured minimum content length — the [`crate::extractor`]
/// stage enforces this before marking an attempt successful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Final URL after any redirects the fetcher followed.
    pub final_url: String,
    /// Cleaned article body text. Empty when `success` is `false`.
    pub body: String,
    /// Optional short excerpt/lede, if the fetcher could identify one.
    pub excerpt: Option<String>,
    /// Optional byline (author attribution).
    pub byline: Option<String>,
    /// Language the fetcher detected in the extracted body, if any.
    pub detected_language: Option<String>,
    /// Tag identifying which extraction technique produced this content
    /// (e.g. `"readability"`, `"boilerplate_removal"`, `"raw_text"`).
    /// Feeds the extraction-method prior in [`compute_quality_score`].
    pub extraction_method: String,
    /// Wall-clock time the fetch took.
    pub duration_ms: u64,
    /// Whether the fetch succeeded.
    pub success: bool,
    /// Machine-readable failure kind, present only when `success` is
    /// `false` (mirrors [`crate::error::PipelineError::kind`] values for
    /// `ExtractionTimeout`/`ExtractionFailed`).
    pub error_kind: Option<String>,
    /// Optional caller-supplied extraction-quality prior in `[0, 100]`,
    /// folded into [`ScoredArticle::quality_score`] as a bonus term
    /// (`quality * 0.2`) per spec.md §9 — never invented independently
    /// of what the collaborator actually returns.
    pub quality: Option<f32>,
}

impl ExtractedContent {
    /// Word count of `body`, used by the word-count band in
    /// [`compute_quality_score`].
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

/// Thresholds governing both validation gates and the quality score's
/// content-length and word-count bands (spec.md §6
/// `extraction.qualityThresholds` / `validation.*`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    /// Minimum body length, in bytes, for an extraction to be usable.
    pub min_content_length: usize,
    /// Maximum body length, in bytes, before content is considered
    /// suspect (e.g. an un-cleaned page dump).
    pub max_content_length: usize,
    /// Minimum word count for an extraction to be usable.
    pub min_word_count: usize,
    /// Maximum ratio of leftover markup to text the fetcher may report
    /// before content is considered poorly cleaned. Passed through to
    /// the score's method prior; the core does not parse HTML itself.
    pub max_html_ratio: f32,
    /// Minimum quality score below which the Extractor's quality-aware
    /// retry kicks in (spec.md §4.4).
    pub min_quality_score: f32,
}

/// Default quality thresholds, matching the defaults documented in
/// spec.md §6.
impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_content_length: 200,
            max_content_length: 200_000,
            min_word_count: 50,
            max_html_ratio: 0.3,
            min_quality_score: 60.0,
        }
    }
}

/// Sweet-spot band for body length, in bytes, used by
/// [`compute_quality_score`] (spec.md §3).
const QUALITY_BODY_SWEET_MIN: f64 = 3_000.0;
const QUALITY_BODY_SWEET_MAX: f64 = 8_000.0;
/// Sweet-spot band for word count.
const QUALITY_WORDS_SWEET_MIN: f64 = 400.0;
const QUALITY_WORDS_SWEET_MAX: f64 = 2_000.0;

const WEIGHT_SUCCESS: f64 = 30.0;
const WEIGHT_BODY_LENGTH: f64 = 25.0;
const WEIGHT_EXCERPT: f64 = 10.0;
const WEIGHT_WORD_COUNT: f64 = 20.0;
const WEIGHT_METHOD_PRIOR: f64 = 15.0;
const CALLER_PRIOR_FACTOR: f64 = 0.2;

/// Scores a bounded contribution to the quality score: `1.0` anywhere
/// inside `[low, high]`, tapering linearly to `0.0` at half of `low` and
/// at one-and-a-half times `high`, clamped to `[0, 1]` outside that.
fn band_fraction(value: f64, low: f64, high: f64) -> f64 {
    if value < low {
        let floor = low / 2.0;
        ((value - floor) / (low - floor)).clamp(0.0, 1.0)
    } else if value > high {
        let ceil = high * 1.5;
        ((ceil - value) / (ceil - high)).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Prior assigned to each known extraction method, scaled by
/// `WEIGHT_METHOD_PRIOR`. Unrecognized methods get a middling prior
/// rather than zero, since an unfamiliar tag is not necessarily a bad
/// extraction.
fn method_prior(method: &str) -> f64 {
    match method {
        "readability" => 1.0,
        "boilerplate_removal" => 0.8,
        "raw_text" => 0.4,
        _ => 0.5,
    }
}

/// Computes the quality score for a piece of extracted content, per
/// spec.md §3: the sum of bounded contributions from the success flag,
/// a body-length sweet-spot band, excerpt presence, a word-count band,
/// an extraction-method prior, and an optional caller-supplied prior.
#[must_use]
pub fn compute_quality_score(content: &ExtractedContent) -> f64 {
    if !content.success {
        return 0.0;
    }

    let body_len = content.body.len() as f64;
    let word_count = content.word_count() as f64;

    let mut score = WEIGHT_SUCCESS;
    score += WEIGHT_BODY_LENGTH * band_fraction(body_len, QUALITY_BODY_SWEET_MIN, QUALITY_BODY_SWEET_MAX);
    score += WEIGHT_WORD_COUNT * band_fraction(word_count, QUALITY_WORDS_SWEET_MIN, QUALITY_WORDS_SWEET_MAX);
    if content.excerpt.as_ref().is_some_and(|e| !e.trim().is_empty()) {
        score += WEIGHT_EXCERPT;
    }
    score += WEIGHT_METHOD_PRIOR * method_prior(&content.extraction_method);
    score += content.quality.map_or(0.0, |q| f64::from(q) * CALLER_PRIOR_FACTOR);

    score
}

/// A search result that has been scored and is a selection candidate.
///
/// Produced twice over the pipeline's life: the Selector (stage C)
/// creates a provisional instance with `content = None`, scored purely
/// by feed order; the Extractor (stage D) replaces it with one carrying
/// real [`ExtractedContent`] and a recomputed [`compute_quality_score`]
/// value — including failure entries, per spec.md §4.4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    /// The underlying search result.
    pub result: SearchResult,
    /// Extracted content, once the Extractor stage has run.
    pub content: Option<ExtractedContent>,
    /// Memoized quality score, computed once at construction time.
    quality_score: f64,
}

impl ScoredArticle {
    /// Builds a provisional `ScoredArticle` before extraction, scored by
    /// feed position only (earlier results rank higher).
    #[must_use]
    pub fn provisional(result: SearchResult) -> Self {
        let quality_score = 100.0 / (result.feed_order as f64 + 1.0);
        Self {
            result,
            content: None,
            quality_score,
        }
    }

    /// Builds a `ScoredArticle` from extracted content, scoring it per
    /// [`compute_quality_score`]. Used by the Extractor for both
    /// successful and failed fetch attempts.
    #[must_use]
    pub fn with_content(result: SearchResult, content: ExtractedContent) -> Self {
        let quality_score = compute_quality_score(&content);
        Self {
            result,
            content: Some(content),
            quality_score,
        }
    }

    /// The memoized quality score. Never recomputed after construction
    /// so ordering stays stable for the lifetime of the value.
    #[must_use]
    pub const fn quality_score(&self) -> f64 {
        self.quality_score
    }

    /// Whether this article's extraction (if any has happened) succeeded.
    #[must_use]
    pub fn extraction_succeeded(&self) -> bool {
        self.content.as_ref().is_some_and(|c| c.success)
    }
}

/// Trust signal assessment from stage 1 (spec.md §4.5), ordered from
/// most to least reassuring so a caller can threshold on it. Discriminants
/// follow the same inverted-ordinal idiom used elsewhere in this codebase
/// for small tri-state severity enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustSignal {
    /// Sources broadly agree on the facts.
    HighAgreement = 0,
    /// Some conflicting details, but not fundamental.
    SomeConflicts = 1,
    /// Sources disagree on core facts.
    MajorDisputes = 2,
}

impl TrustSignal {
    /// String representation matching the wire/schema values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighAgreement => "high_agreement",
            Self::SomeConflicts => "some_conflicts",
            Self::MajorDisputes => "major_disputes",
        }
    }

    /// Parses the schema's string values; unrecognized strings are
    /// treated as the most cautious signal rather than rejected outright.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "high_agreement" => Self::HighAgreement,
            "some_conflicts" => Self::SomeConflicts,
            _ => Self::MajorDisputes,
        }
    }
}

impl std::fmt::Display for TrustSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage 1 payload: Context & Trust (critical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAndTrust {
    /// Short summary of the overall story (≤25 words, not enforced by
    /// the type — the prompt asks for it and schema validation only
    /// checks field presence, per spec.md §4.5).
    pub story_summary: String,
    /// Cross-source trust signal.
    pub trust_signal: TrustSignal,
    /// Suggested reader action (≤20 words).
    pub reader_action: String,
}

impl Default for ContextAndTrust {
    fn default() -> Self {
        Self {
            story_summary: String::new(),
            trust_signal: TrustSignal::MajorDisputes,
            reader_action: String::new(),
        }
    }
}

/// One point of cross-source agreement (stage 2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusFact {
    /// The agreed-upon fact.
    pub fact: String,
    /// Sources (by name) confirming it. Must have at least 2 entries for
    /// a well-formed consensus item, per spec.md §4.5.
    pub sources: Vec<String>,
}

/// Stage 2 payload: Consensus (critical). Up to 4 items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    /// Points of cross-source agreement.
    pub consensus: Vec<ConsensusFact>,
}

/// One disputed factual claim (stage 3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactualDispute {
    /// What the dispute concerns.
    pub what: String,
    /// One side's claim.
    pub claim_a: String,
    /// The other side's claim.
    pub claim_b: String,
    /// Sources backing `claim_a`.
    pub sources_a: Vec<String>,
    /// Sources backing `claim_b`.
    pub sources_b: Vec<String>,
}

/// Stage 3 payload: Factual Disputes (non-critical). Up to 3 items; may
/// be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactualDisputes {
    /// Disputed factual claims.
    pub factual_disputes: Vec<FactualDispute>,
}

/// One way coverage diverges between groups of sources (stage 4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageAngle {
    /// Short label for this angle of coverage.
    pub angle: String,
    /// Name for the first group of sources.
    pub group1: String,
    /// Sources in the first group.
    pub group1_sources: Vec<String>,
    /// Name for the second group of sources.
    pub group2: String,
    /// Sources in the second group.
    pub group2_sources: Vec<String>,
}

/// Stage 4 payload: Perspective Differences (non-critical). Up to 3
/// items; may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerspectiveDifferences {
    /// Distinct coverage angles.
    pub coverage_angles: Vec<CoverageAngle>,
}

/// Outcome of one analysis stage (spec.md §3, §4.5 state machine).
///
/// Always carries a payload: on failure of a non-critical stage, the
/// caller substitutes the stage's defined empty result rather than
/// leaving a hole, per spec.md §4.5. Critical-stage failures never reach
/// this type at all — they short-circuit `Analyze()` with
/// [`crate::error::PipelineError::CriticalAnalysisStageFailed`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome<T> {
    /// Stage identifier, 1-4.
    pub stage_id: u8,
    /// Whether this stage's failure would halt the pipeline.
    pub critical: bool,
    /// The stage's payload — real on success, the defined empty value on
    /// a recorded non-critical failure.
    pub payload: T,
    /// Whether the model actually produced `payload`, as opposed to it
    /// being a substituted empty default.
    pub success: bool,
    /// Machine-readable failure kind, present only when `success` is
    /// `false`.
    pub error_kind: Option<String>,
    /// Wall-clock duration of this stage's model call(s), including
    /// retries and provider fallback.
    pub duration_ms: u64,
}

/// Durations for the Analyzer's four sequential stage calls, in
/// milliseconds, matching `stageDurationsMs[4]` in the output artifact.
pub type StageDurationsMs = [u64; 4];

/// The article `Analyze()` is called with (spec.md §3/§6 `input`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInput {
    /// The article's URL. Excluded from the Dispatcher's results as the
    /// input article itself, per spec.md §4.3 step 1.
    pub url: String,
    /// The article's title, used to plan the search query.
    pub title: String,
    /// Declared source name, if known.
    pub source: Option<String>,
    /// Declared language, if known. Informational only — the
    /// QueryPlanner always detects the title's language itself rather
    /// than trusting this field.
    pub language: Option<String>,
}

/// Echo of the input article, carried in the final artifact (spec.md
/// §6 `input`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleInputEcho {
    /// The input article's URL.
    pub url: String,
    /// The input article's title.
    pub title: String,
    /// The input article's declared source, if any.
    pub source: Option<String>,
    /// The input article's declared language, if any.
    pub language: Option<String>,
}

impl From<&ArticleInput> for ArticleInputEcho {
    fn from(input: &ArticleInput) -> Self {
        Self {
            url: input.url.clone(),
            title: input.title.clone(),
            source: input.source.clone(),
            language: input.language.clone(),
        }
    }
}

/// Echo of the query actually used for retrieval (spec.md §6 `query`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEcho {
    /// The text used to search.
    pub search_text: String,
    /// Best-effort detected source language.
    pub detected_language: Option<String>,
    /// Whether `search_text` is a translation of the original title.
    pub was_translated: bool,
}

/// The four stage outcomes, grouped (spec.md §6 `stages`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesBlock {
    /// Stage 1 outcome.
    pub stage1: StageOutcome<ContextAndTrust>,
    /// Stage 2 outcome.
    pub stage2: StageOutcome<Consensus>,
    /// Stage 3 outcome.
    pub stage3: StageOutcome<FactualDisputes>,
    /// Stage 4 outcome.
    pub stage4: StageOutcome<PerspectiveDifferences>,
}

/// Run-level metadata attached to the final artifact (spec.md §6
/// `metadata`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Name of the model provider that ultimately served the analysis
    /// (the provider the fallback chain settled on for the run).
    pub model_provider: String,
    /// Number of articles that made it into the Analyzer stage (i.e.
    /// successfully extracted).
    pub articles_analyzed: usize,
    /// Number of articles Selector handed to the Extractor in total.
    pub articles_input: usize,
    /// Wall-clock duration of the whole pipeline run, in milliseconds.
    pub total_duration_ms: u64,
    /// Per-stage durations for the four Analyzer calls, in milliseconds.
    pub stage_durations_ms: StageDurationsMs,
    /// Wall-clock time the run completed, RFC 3339 / ISO 8601.
    pub timestamp: String,
}

/// Final output of a full `Analyze()` call (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    /// Echo of the input article.
    pub input: ArticleInputEcho,
    /// Echo of the query used for retrieval.
    pub query: QueryEcho,
    /// Articles that were handed to the Analyzer (including any that
    /// failed extraction, per spec.md §3's `ScoredArticle` lifecycle).
    pub articles: Vec<ScoredArticle>,
    /// The four analysis stage outcomes.
    pub stages: StagesBlock,
    /// Run metadata.
    pub metadata: AnalysisMetadata,
}

/// Elapsed-time helper shared by stage timing code. Returns milliseconds,
/// saturating rather than panicking on pathological durations.
#[must_use]
pub fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
