//! Relevance scoring for search results
//!
//! A pure function of the result and the query: no I/O, deterministic for a
//! fixed (result, query) pair, always in [0, 1].

/// Weighted relevance scorer
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    /// Weight for query-term coverage
    pub text_weight: f64,

    /// Weight for source-domain quality
    pub domain_weight: f64,

    /// Domains treated as high quality beyond the suffix rule
    quality_domains: Vec<String>,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self {
            text_weight: 0.7,
            domain_weight: 0.3,
            quality_domains: Vec::new(),
        }
    }
}

impl RelevanceScorer {
    /// Create with a configured allow-list of high-quality domains
    pub fn new(quality_domains: Vec<String>) -> Self {
        Self {
            quality_domains: quality_domains
                .into_iter()
                .map(|d| d.to_lowercase())
                .collect(),
            ..Self::default()
        }
    }

    /// Score a single result against a query, rounded to 2 decimals
    pub fn score(&self, query: &str, title: &str, text: &str, domain: &str) -> f64 {
        let raw = self.text_weight * text_relevance(query, title, text)
            + self.domain_weight * self.domain_quality(domain);
        round2(raw)
    }

    /// 1.0 for .gov/.edu/.org and allow-listed outlets, else 0.6
    pub fn domain_quality(&self, domain: &str) -> f64 {
        let domain = domain.to_lowercase();

        if domain.ends_with(".gov") || domain.ends_with(".edu") || domain.ends_with(".org") {
            return 1.0;
        }

        let allowed = self
            .quality_domains
            .iter()
            .any(|q| domain == *q || domain.ends_with(&format!(".{}", q)));

        if allowed {
            1.0
        } else {
            0.6
        }
    }
}

/// Fraction of distinct query terms occurring as substrings of title+text
fn text_relevance(query: &str, title: &str, text: &str) -> f64 {
    let haystack = format!("{} {}", title, text).to_lowercase();

    let mut terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    terms.sort();
    terms.dedup();

    if terms.is_empty() {
        return 0.0;
    }

    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_in_bounds() {
        let scorer = RelevanceScorer::new(vec![]);
        let score = scorer.score(
            "rust async runtimes",
            "Comparing async runtimes in Rust",
            "tokio and async-std benchmarked",
            "blog.example.com",
        );
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_full_match_quality_domain() {
        let scorer = RelevanceScorer::new(vec![]);
        let score = scorer.score(
            "climate report",
            "Climate report 2026",
            "the full climate assessment",
            "epa.gov",
        );
        // All terms match and the domain scores 1.0
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_partial_match_ordinary_domain() {
        let scorer = RelevanceScorer::new(vec![]);
        // 1 of 2 terms matches: 0.7 * 0.5 + 0.3 * 0.6 = 0.53
        let score = scorer.score("alpha beta", "alpha only", "", "example.com");
        assert_eq!(score, 0.53);
    }

    #[test]
    fn test_deterministic() {
        let scorer = RelevanceScorer::new(vec!["reuters.com".into()]);
        let a = scorer.score("q w", "q", "w", "reuters.com");
        let b = scorer.score("q w", "q", "w", "reuters.com");
        assert_eq!(a, b);
    }

    #[test]
    fn test_allow_list_and_subdomains() {
        let scorer = RelevanceScorer::new(vec!["reuters.com".into()]);
        assert_eq!(scorer.domain_quality("reuters.com"), 1.0);
        assert_eq!(scorer.domain_quality("uk.reuters.com"), 1.0);
        assert_eq!(scorer.domain_quality("reuters.com.evil.net"), 0.6);
    }

    #[test]
    fn test_suffix_rule() {
        let scorer = RelevanceScorer::new(vec![]);
        assert_eq!(scorer.domain_quality("mit.edu"), 1.0);
        assert_eq!(scorer.domain_quality("wikipedia.org"), 1.0);
        assert_eq!(scorer.domain_quality("example.io"), 0.6);
    }

    #[test]
    fn test_duplicate_terms_counted_once() {
        let scorer = RelevanceScorer::new(vec![]);
        let a = scorer.score("rust rust rust", "rust guide", "", "example.com");
        let b = scorer.score("rust", "rust guide", "", "example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_query_scores_domain_only() {
        let scorer = RelevanceScorer::new(vec![]);
        let score = scorer.score("", "title", "text", "example.com");
        assert_eq!(score, 0.18);
    }
}
