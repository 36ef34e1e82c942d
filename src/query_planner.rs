//! Stage A: turns an article title into a normalized search query
//! (spec.md §4.1).
//!
//! Detects the title's language, and if it's not English, attempts a
//! translation so country search feeds can be queried in a consistent
//! language. Both collaborators are best-effort: a failure degrades to the
//! original title rather than aborting the run, except for the one case
//! spec.md calls out as fatal — an empty or whitespace-only title.

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

/// Confidence a [`LanguageDetector`] reports alongside its guess.
pub type Confidence = f32;

/// External collaborator: detects the language of a title.
///
/// Implementations talk to whatever detection service/library the caller
/// wants; this trait only fixes the shape of the call.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Detects the language of `text`, returning an ISO 639-1-ish code
    /// (e.g. `"en"`, `"ja"`) and a confidence in `[0, 1]`.
    async fn detect(&self, text: &str) -> std::result::Result<(String, Confidence), String>;
}

/// External collaborator: translates text into English.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` from `source_language` into English.
    async fn translate(&self, text: &str, source_language: &str) -> std::result::Result<String, String>;
}

/// Result of planning a search query from an input title (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// The text to search with: the original title if it was already
    /// English (or translation failed), otherwise the translated title.
    pub search_text: String,
    /// Best-effort detected source language code, or `None` if detection
    /// failed and the script-range heuristic also could not classify it.
    pub detected_source_language: Option<String>,
    /// Whether `search_text` is a translation of the original title.
    pub was_translated: bool,
}

/// Classifies a title's likely script when the configured detector's
/// confidence falls below the floor, or the detector itself fails.
///
/// This is plain character-range classification, not a statistical
/// guess: it looks at the dominant Unicode block among the title's
/// letters. Returns `None` if no letter fell into a recognized range
/// (e.g. pure digits/punctuation).
#[must_use]
pub fn script_range_heuristic(text: &str) -> Option<&'static str> {
    let mut latin = 0usize;
    let mut cjk = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;
    let mut hangul = 0usize;

    for ch in text.chars() {
        let code = ch as u32;
        if ch.is_ascii_alphabetic() {
            latin += 1;
        } else if (0x4E00..=0x9FFF).contains(&code) || (0x3040..=0x30FF).contains(&code) {
            cjk += 1;
        } else if (0x0400..=0x04FF).contains(&code) {
            cyrillic += 1;
        } else if (0x0600..=0x06FF).contains(&code) {
            arabic += 1;
        } else if (0xAC00..=0xD7A3).contains(&code) {
            hangul += 1;
        }
    }

    let counts = [
        ("en", latin),
        ("zh", cjk),
        ("ru", cyrillic),
        ("ar", arabic),
        ("ko", hangul),
    ];

    counts
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(lang, _)| lang)
}

/// Plans a search query from an article title.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if `title` is empty or
/// whitespace-only. All other failures (detector/translator errors, low
/// detector confidence) degrade gracefully rather than erroring.
pub async fn plan_query(
    title: &str,
    detector: &dyn LanguageDetector,
    translator: &dyn Translator,
    confidence_floor: f32,
) -> Result<QueryPlan> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput {
            message: "article title is empty or whitespace-only".to_string(),
        });
    }

    let detected = match detector.detect(trimmed).await {
        Ok((language, confidence)) if confidence >= confidence_floor => Some(language),
        Ok(_) | Err(_) => script_range_heuristic(trimmed).map(ToString::to_string),
    };

    let Some(language) = detected else {
        return Ok(QueryPlan {
            search_text: trimmed.to_string(),
            detected_source_language: None,
            was_translated: false,
        });
    };

    if language == "en" {
        return Ok(QueryPlan {
            search_text: trimmed.to_string(),
            detected_source_language: Some(language),
            was_translated: false,
        });
    }

    match translator.translate(trimmed, &language).await {
        Ok(translated) if !translated.trim().is_empty() => Ok(QueryPlan {
            search_text: translated,
            detected_source_language: Some(language),
            was_translated: true,
        }),
        Ok(_) | Err(_) => Ok(QueryPlan {
            search_text: trimmed.to_string(),
            detected_source_language: Some(language),
            was_translated: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDetector {
        result: std::result::Result<(String, Confidence), String>,
    }

    #[async_trait]
    impl LanguageDetector for MockDetector {
        async fn detect(&self, _text: &str) -> std::result::Result<(String, Confidence), String> {
            self.result.clone()
        }
    }

    struct MockTranslator {
        result: std::result::Result<String, String>,
    }

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate(&self, _text: &str, _source_language: &str) -> std::result::Result<String, String> {
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn empty_title_is_invalid_input() {
        let detector = MockDetector {
            result: Ok(("en".to_string(), 0.9)),
        };
        let translator = MockTranslator {
            result: Ok(String::new()),
        };
        let err = plan_query("   ", &detector, &translator, 0.6).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn english_title_is_used_as_is() {
        let detector = MockDetector {
            result: Ok(("en".to_string(), 0.95)),
        };
        let translator = MockTranslator {
            result: Ok("should not be used".to_string()),
        };
        let plan = plan_query("Some headline", &detector, &translator, 0.6)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(plan.search_text, "Some headline");
        assert!(!plan.was_translated);
    }

    #[tokio::test]
    async fn non_english_title_is_translated() {
        let detector = MockDetector {
            result: Ok(("ja".to_string(), 0.9)),
        };
        let translator = MockTranslator {
            result: Ok("Translated headline".to_string()),
        };
        let plan = plan_query("元の見出し", &detector, &translator, 0.6)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(plan.search_text, "Translated headline");
        assert_eq!(plan.detected_source_language.as_deref(), Some("ja"));
        assert!(plan.was_translated);
    }

    #[tokio::test]
    async fn low_confidence_falls_back_to_script_heuristic() {
        let detector = MockDetector {
            result: Ok(("fr".to_string(), 0.1)),
        };
        let translator = MockTranslator {
            result: Ok("Translated".to_string()),
        };
        let plan = plan_query("Заголовок новости", &detector, &translator, 0.6)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(plan.detected_source_language.as_deref(), Some("ru"));
    }

    #[tokio::test]
    async fn detector_failure_falls_back_to_script_heuristic() {
        let detector = MockDetector {
            result: Err("detector unavailable".to_string()),
        };
        let translator = MockTranslator {
            result: Ok("Translated".to_string()),
        };
        let plan = plan_query("Hello world", &detector, &translator, 0.6)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(plan.detected_source_language.as_deref(), Some("en"));
        assert!(!plan.was_translated);
    }

    #[tokio::test]
    async fn translation_failure_degrades_to_original_title() {
        let detector = MockDetector {
            result: Ok(("ja".to_string(), 0.9)),
        };
        let translator = MockTranslator {
            result: Err("translator down".to_string()),
        };
        let plan = plan_query("元の見出し", &detector, &translator, 0.6)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(plan.search_text, "元の見出し");
        assert!(!plan.was_translated);
    }

    #[test]
    fn script_heuristic_handles_digits_only() {
        assert_eq!(script_range_heuristic("12345"), None);
    }
}
