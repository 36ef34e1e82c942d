//! Stage C: dedupes, ranks, and trims search hits into a bounded,
//! country-balanced candidate set for extraction (spec.md §4.3).

use std::collections::HashSet;

use crate::error::PipelineError;
use crate::model::{ScoredArticle, SearchResult, SelectionTargets};

/// Minimum title length, in characters, to be considered a valid
/// candidate (spec.md §4.3 step 3).
const MIN_TITLE_LENGTH: usize = 10;

/// Normalizes a title for dedupe-key purposes: lowercased, punctuation
/// stripped, whitespace collapsed.
fn normalize_title_key(title: &str) -> String {
    let mut key = String::with_capacity(title.len());
    let mut last_was_space = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            key.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            key.push(' ');
            last_was_space = true;
        }
    }
    key.trim().to_string()
}

/// Selects a bounded, deduped, per-country-balanced candidate set from
/// raw search hits, per the six-step algorithm in spec.md §4.3.
///
/// Returns the selected candidates (as provisional, not-yet-extracted
/// [`ScoredArticle`]s — see [`ScoredArticle::provisional`]) plus an
/// optional [`PipelineError::InsufficientCoverage`] advisory. Selection
/// itself never fails outright; the advisory is the caller's to surface
/// or ignore.
#[must_use]
pub fn select(
    hits: Vec<SearchResult>,
    input_url: &str,
    input_title: &str,
    targets: &SelectionTargets,
) -> (Vec<ScoredArticle>, Option<PipelineError>) {
    let input_title_key = normalize_title_key(input_title);
    let input_title_is_meaningful = input_title.trim().len() >= MIN_TITLE_LENGTH;

    // Steps 1-3: drop the input article itself, dedupe by URL and
    // normalized title (first occurrence wins, i.e. relevance order),
    // and drop titles too short to be meaningful, while grouping by
    // country in feed order.
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut by_country: Vec<(String, Vec<SearchResult>)> = Vec::new();

    for hit in hits {
        if hit.url == input_url {
            continue;
        }
        if hit.raw_title.trim().len() < MIN_TITLE_LENGTH {
            continue;
        }
        let title_key = normalize_title_key(&hit.raw_title);
        if input_title_is_meaningful && title_key == input_title_key {
            continue;
        }
        if !seen_urls.insert(hit.url.clone()) {
            continue;
        }
        if !seen_titles.insert(title_key) {
            continue;
        }

        match by_country.iter_mut().find(|(code, _)| *code == hit.country_code) {
            Some((_, bucket)) => bucket.push(hit),
            None => by_country.push((hit.country_code.clone(), vec![hit])),
        }
    }

    // Step 4: within each country, rank (provisionally, by feed order —
    // no content has been extracted yet) and take the requested count.
    let mut per_country_selected: Vec<(String, Vec<ScoredArticle>)> = by_country
        .into_iter()
        .map(|(code, mut hits)| {
            hits.sort_by_key(|h| h.feed_order);
            let requested = targets.per_country.get(&code).copied().unwrap_or(0);
            let scored: Vec<ScoredArticle> = hits
                .into_iter()
                .take(requested)
                .map(ScoredArticle::provisional)
                .collect();
            (code, scored)
        })
        .filter(|(_, scored)| !scored.is_empty())
        .collect();
    per_country_selected.sort_by(|a, b| a.0.cmp(&b.0));

    let total_selected: usize = per_country_selected.iter().map(|(_, v)| v.len()).sum();
    let countries_represented = per_country_selected.len();

    // Step 5: proportional trim if the combined set exceeds the cap.
    // `max(1, floor(max_for_analysis * (original_target / total_requested)))`
    // guarantees every represented country keeps at least one slot.
    let total_requested = targets.total_requested().max(1);
    let final_per_country: Vec<(String, Vec<ScoredArticle>)> = if total_selected <= targets.max_for_analysis {
        per_country_selected
    } else {
        per_country_selected
            .into_iter()
            .map(|(code, mut scored)| {
                let original_target = targets.per_country.get(&code).copied().unwrap_or(scored.len());
                let share = (targets.max_for_analysis * original_target) / total_requested;
                let keep = share.max(1);
                scored.truncate(keep);
                (code, scored)
            })
            .collect()
    };

    // Step 6: round-robin interleave across countries, then flat-truncate
    // to the cap if proportional trimming still left it over (rounding).
    let mut selected = round_robin_interleave(final_per_country);
    selected.truncate(targets.max_for_analysis);

    let shortfall = targets
        .per_country
        .iter()
        .any(|(code, requested)| {
            let have = selected.iter().filter(|a| &a.result.country_code == code).count();
            have < *requested
        });
    let advisory = shortfall.then(|| PipelineError::InsufficientCoverage {
        available: selected.len(),
        countries: countries_represented,
    });

    (selected, advisory)
}

/// Interleaves per-country buckets round-robin so the final ordering
/// alternates across countries rather than exhausting one before moving
/// to the next.
fn round_robin_interleave(mut buckets: Vec<(String, Vec<ScoredArticle>)>) -> Vec<ScoredArticle> {
    let mut result = Vec::new();
    loop {
        let mut any_left = false;
        for (_, bucket) in &mut buckets {
            if !bucket.is_empty() {
                result.push(bucket.remove(0));
                any_left = true;
            }
        }
        if !any_left {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hit(country: &str, url: &str, title: &str, feed_order: usize) -> SearchResult {
        SearchResult {
            country_code: country.to_string(),
            language: "en".to_string(),
            url: url.to_string(),
            raw_title: title.to_string(),
            source_name: "Example".to_string(),
            published_at_ms: None,
            snippet: None,
            feed_order,
        }
    }

    fn targets_with(per_country: &[(&str, usize)], buffer: usize, max: usize) -> SelectionTargets {
        SelectionTargets {
            per_country: per_country.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            buffer_per_country: buffer,
            max_for_analysis: max,
        }
    }

    fn targets() -> SelectionTargets {
        targets_with(&[("us", 2), ("gb", 2)], 1, 12)
    }

    #[test]
    fn drops_hit_matching_input_url() {
        let hits = vec![
            hit("us", "https://input", "Irrelevant Title Here", 0),
            hit("us", "https://other", "Other Title Entirely", 1),
        ];
        let (selected, _) = select(hits, "https://input", "Some long enough title", &targets());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].result.url, "https://other");
    }

    #[test]
    fn drops_titles_shorter_than_minimum() {
        let hits = vec![hit("us", "https://short", "Too Short", 0)];
        let (selected, _) = select(hits, "https://input", "unrelated long enough", &targets());
        assert!(selected.is_empty());
    }

    #[test]
    fn dedupes_by_url_across_countries() {
        let hits = vec![
            hit("us", "https://dup", "Shared Headline Text", 0),
            hit("gb", "https://dup", "Shared Headline Text", 0),
        ];
        let (selected, _) = select(hits, "https://input", "unrelated", &targets());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn dedupes_by_normalized_title() {
        let hits = vec![
            hit("us", "https://a", "Breaking: Big News Today!", 0),
            hit("gb", "https://b", "breaking big news today", 1),
        ];
        let (selected, _) = select(hits, "https://input", "unrelated", &targets());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn short_input_title_does_not_dedupe_by_title() {
        let hits = vec![hit("us", "https://other", "Long Enough Other", 0)];
        let (selected, _) = select(hits, "https://input", "Hi", &targets());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn per_country_respects_requested_counts() {
        let hits = vec![
            hit("us", "https://us1", "Us One Headline Story", 0),
            hit("us", "https://us2", "Us Two Headline Story", 1),
            hit("us", "https://us3", "Us Three Headline Story", 2),
            hit("gb", "https://gb1", "Gb One Headline Story", 0),
            hit("gb", "https://gb2", "Gb Two Headline Story", 1),
        ];
        let (selected, _) = select(hits, "https://input", "unrelated", &targets());
        let us_count = selected.iter().filter(|a| a.result.country_code == "us").count();
        let gb_count = selected.iter().filter(|a| a.result.country_code == "gb").count();
        assert_eq!(us_count, 2);
        assert_eq!(gb_count, 2);
    }

    #[test]
    fn country_with_zero_requested_is_skipped() {
        let hits = vec![hit("fr", "https://fr1", "France Headline Story", 0)];
        let targets = targets_with(&[("us", 2), ("fr", 0)], 1, 12);
        let (selected, _) = select(hits, "https://input", "unrelated", &targets);
        assert!(selected.is_empty());
    }

    #[test]
    fn round_robin_interleaves_countries() {
        let hits = vec![
            hit("us", "https://us1", "Us One Headline Story", 0),
            hit("us", "https://us2", "Us Two Headline Story", 1),
            hit("gb", "https://gb1", "Gb One Headline Story", 0),
        ];
        let (selected, _) = select(hits, "https://input", "unrelated", &targets());
        assert_eq!(selected[0].result.country_code, "gb");
        assert_eq!(selected[1].result.country_code, "us");
    }

    #[test]
    fn insufficient_coverage_is_advisory_not_fatal() {
        let hits = vec![hit("us", "https://us1", "Us One Headline Story", 0)];
        let (selected, advisory) = select(hits, "https://input", "unrelated", &targets());
        assert_eq!(selected.len(), 1);
        assert!(advisory.is_some());
    }

    #[test]
    fn proportional_trim_keeps_every_country_represented() {
        let hits = vec![
            hit("us", "https://us1", "Us One Headline Story", 0),
            hit("us", "https://us2", "Us Two Headline Story", 1),
            hit("gb", "https://gb1", "Gb One Headline Story", 0),
            hit("gb", "https://gb2", "Gb Two Headline Story", 1),
            hit("jp", "https://jp1", "Jp One Headline Story", 0),
            hit("jp", "https://jp2", "Jp Two Headline Story", 1),
        ];
        let targets = targets_with(&[("us", 2), ("gb", 2), ("jp", 2)], 0, 3);
        let (selected, _) = select(hits, "https://input", "unrelated", &targets);
        assert!(selected.len() <= 3);
        let countries: std::collections::BTreeSet<&str> =
            selected.iter().map(|a| a.result.country_code.as_str()).collect();
        assert_eq!(countries.len(), 3, "every country should keep at least one slot");
    }

    #[test]
    fn selected_urls_and_titles_are_pairwise_distinct() {
        let hits = vec![
            hit("us", "https://a", "First Unique Headline", 0),
            hit("us", "https://b", "Second Unique Headline", 1),
            hit("gb", "https://c", "Third Unique Headline", 0),
        ];
        let targets = targets_with(&[("us", 2), ("gb", 1)], 0, 12);
        let (selected, _) = select(hits, "https://input", "unrelated", &targets);
        let urls: BTreeMap<&str, ()> = selected.iter().map(|a| (a.result.url.as_str(), ())).collect();
        assert_eq!(urls.len(), selected.len());
    }
}
