//! Search aggregation
//!
//! Fans sub-queries out to the search capability, normalizes and scores each
//! hit, then merges everything into one deduplicated, score-sorted list.
//! Individual sub-query failures contribute an empty set rather than
//! aborting the pass.

use crate::pipeline::RelevanceScorer;
use crate::websearch::{WebHit, WebSearcher};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A normalized, scored search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub source_domain: String,
    pub published_at: DateTime<Utc>,
    pub relevance_score: f64,
}

pub struct SearchAggregator {
    scorer: RelevanceScorer,
    results_per_call: usize,
}

impl SearchAggregator {
    pub fn new(scorer: RelevanceScorer, results_per_call: usize) -> Self {
        Self {
            scorer,
            results_per_call,
        }
    }

    /// One sub-query pass: a plain call plus a current-year-enriched call,
    /// both capped, concatenated in call order, normalized and scored
    /// against the original query.
    pub async fn search_sub_query(
        &self,
        searcher: &dyn WebSearcher,
        sub_query: &str,
        original_query: &str,
    ) -> Vec<RankedResult> {
        let enriched = format!("{} {}", sub_query, Utc::now().year());

        let (plain, yearly) = tokio::join!(
            searcher.search(sub_query, self.results_per_call),
            searcher.search(&enriched, self.results_per_call)
        );

        let mut hits = Vec::new();
        for outcome in [plain, yearly] {
            match outcome {
                Ok(batch) => hits.extend(batch),
                Err(e) => {
                    tracing::warn!(sub_query = %sub_query, error = %e, "Sub-query search failed");
                }
            }
        }

        let now = Utc::now();
        hits.into_iter()
            .map(|hit| self.normalize(hit, original_query, now))
            .collect()
    }

    fn normalize(&self, hit: WebHit, original_query: &str, now: DateTime<Utc>) -> RankedResult {
        let snippet = clean_snippet(&hit.snippet);
        let source_domain = domain_of(&hit.link);
        let published_at = extract_publish_date(hit.date.as_deref(), &hit.snippet, now);
        let relevance_score =
            self.scorer
                .score(original_query, &hit.title, &snippet, &source_domain);

        RankedResult {
            title: hit.title,
            snippet,
            url: hit.link,
            source_domain,
            published_at,
            relevance_score,
        }
    }
}

/// Merge all sub-query passes: dedup by exact URL (first occurrence wins,
/// insertion order preserved), then stable-sort by descending score so
/// first-seen order survives among ties.
pub fn dedup_and_rank(results: Vec<RankedResult>) -> Vec<RankedResult> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RankedResult> = results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect();

    merged.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    merged
}

/// Collapse whitespace runs and drop most punctuation from a snippet
pub(crate) fn clean_snippet(snippet: &str) -> String {
    let filtered: String = snippet
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '-' | '%' | '$' | '\'') {
                c
            } else {
                ' '
            }
        })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Host portion of a URL, lowercased, without a leading "www."
pub(crate) fn domain_of(url: &str) -> String {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(after_scheme);

    host.trim_start_matches("www.").to_lowercase()
}

/// Publish date from provider metadata when present, else a scan of the
/// snippet text, else the supplied fetch time.
pub(crate) fn extract_publish_date(
    metadata: Option<&str>,
    snippet: &str,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(raw) = metadata {
        if let Some(date) = parse_date_text(raw) {
            return date;
        }
    }

    if let Some(date) = scan_snippet_for_date(snippet) {
        return date;
    }

    fallback
}

fn parse_date_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return to_utc_midnight(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%b %d, %Y") {
        return to_utc_midnight(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%B %d, %Y") {
        return to_utc_midnight(date);
    }

    None
}

fn scan_snippet_for_date(snippet: &str) -> Option<DateTime<Utc>> {
    let iso = Regex::new(r"\b(20\d{2})-(\d{2})-(\d{2})\b").unwrap();
    if let Some(caps) = iso.captures(snippet) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return to_utc_midnight(date);
    }

    let verbose = Regex::new(
        r"\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s+(20\d{2})\b",
    )
    .unwrap();
    if let Some(caps) = verbose.captures(snippet) {
        let month = month_number(&caps[1])?;
        let date =
            NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?)?;
        return to_utc_midnight(date);
    }

    None
}

fn to_utc_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "January" => 1,
        "February" => 2,
        "March" => 3,
        "April" => 4,
        "May" => 5,
        "June" => 6,
        "July" => 7,
        "August" => 8,
        "September" => 9,
        "October" => 10,
        "November" => 11,
        "December" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(url: &str, score: f64) -> RankedResult {
        RankedResult {
            title: format!("title for {}", url),
            snippet: String::new(),
            url: url.to_string(),
            source_domain: domain_of(url),
            published_at: Utc::now(),
            relevance_score: score,
        }
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let a = ranked("https://example.com/a", 0.5);
        let mut a_dup = ranked("https://example.com/a", 0.9);
        a_dup.title = "duplicate".to_string();
        let b = ranked("https://example.com/b", 0.5);

        let merged = dedup_and_rank(vec![a.clone(), a_dup, b.clone()]);

        assert_eq!(merged.len(), 2);
        let urls: HashSet<_> = merged.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls.len(), 2);
        // First occurrence of the duplicated URL is the survivor
        assert_eq!(merged.iter().find(|r| r.url == a.url).unwrap().title, a.title);
    }

    #[test]
    fn test_sort_descending_stable_on_ties() {
        let first = ranked("https://example.com/1", 0.5);
        let second = ranked("https://example.com/2", 0.5);
        let top = ranked("https://example.com/3", 0.8);

        let merged = dedup_and_rank(vec![first.clone(), second.clone(), top.clone()]);

        assert_eq!(merged[0].url, top.url);
        // Equal scores keep first-seen order
        assert_eq!(merged[1].url, first.url);
        assert_eq!(merged[2].url, second.url);
    }

    #[test]
    fn test_clean_snippet() {
        let cleaned = clean_snippet("Rust!  is \"great\"\n\n(really) 99% sure...");
        assert_eq!(cleaned, "Rust is great really 99% sure...");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.Example.com/path?q=1"), "example.com");
        assert_eq!(domain_of("http://sub.news.org/x"), "sub.news.org");
        assert_eq!(domain_of("example.net"), "example.net");
    }

    #[test]
    fn test_date_from_metadata() {
        let fallback = Utc::now();
        let date = extract_publish_date(Some("2026-03-14"), "", fallback);
        assert_eq!(date.to_rfc3339(), "2026-03-14T00:00:00+00:00");
    }

    #[test]
    fn test_date_from_snippet_scan() {
        let fallback = Utc::now();
        let date = extract_publish_date(None, "Published March 14, 2026 by staff", fallback);
        assert_eq!(date.to_rfc3339(), "2026-03-14T00:00:00+00:00");
    }

    #[test]
    fn test_date_defaults_to_fetch_time() {
        let fallback = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let date = extract_publish_date(Some("3 days ago"), "no dates here", fallback);
        assert_eq!(date, fallback);
    }
}
