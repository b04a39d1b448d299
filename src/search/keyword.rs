//! Keyword patterns and the relevance heuristic

use crate::error::Error;
use anyhow::Result;
use regex::{Regex, RegexBuilder};

/// Free text split on whitespace, without case-insensitive repeats
pub fn split_keywords(query: &str) -> Vec<&str> {
    let mut keywords: Vec<&str> = Vec::new();
    for word in query.split_whitespace() {
        let lower = word.to_lowercase();
        if !keywords.iter().any(|k| k.to_lowercase() == lower) {
            keywords.push(word);
        }
    }
    keywords
}

fn compile(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|source| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
            .into()
        })
}

/// One alternation over the escaped keywords, matching any of them
pub fn build_keyword_pattern(keywords: &[&str], case_sensitive: bool) -> Result<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    compile(&alternation, case_sensitive)
}

/// Compiled form of a free-text query
pub struct QueryMatcher {
    /// Matches any keyword, or the raw pattern in regex mode
    pub pattern: Regex,
    /// One matcher per distinct keyword; just the raw pattern in regex mode
    terms: Vec<Regex>,
}

impl QueryMatcher {
    /// Keyword mode: OR over escaped keywords
    pub fn keywords(query: &str, case_sensitive: bool) -> Result<Option<Self>> {
        let keywords = split_keywords(query);
        if keywords.is_empty() {
            return Ok(None);
        }
        let terms = keywords
            .iter()
            .map(|k| compile(&regex::escape(k), case_sensitive))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Self {
            pattern: build_keyword_pattern(&keywords, case_sensitive)?,
            terms,
        }))
    }

    /// Regex mode: the query is used as written
    pub fn regex(pattern: &str, case_sensitive: bool) -> Result<Option<Self>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let regex = compile(pattern, case_sensitive)?;
        Ok(Some(Self {
            pattern: regex.clone(),
            terms: vec![regex],
        }))
    }

    fn fraction_in(&self, text: &str) -> f64 {
        let hits = self.terms.iter().filter(|t| t.is_match(text)).count();
        hits as f64 / self.terms.len() as f64
    }

    /// Relevance in `[0, 1]`
    ///
    /// `min(matches / 10, 0.4)`, plus up to 0.3 scaled by the share of terms
    /// found in the name or title, plus up to 0.3 by the share found in the
    /// preview.
    pub fn score(&self, match_count: usize, name: &str, preview: &str) -> f64 {
        let frequency = (match_count as f64 / 10.0).min(0.4);
        frequency + 0.3 * self.fraction_in(name) + 0.3 * self.fraction_in(preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keywords_dedupes() {
        assert_eq!(split_keywords(" auth  Token auth TOKEN x "), vec!["auth", "Token", "x"]);
        assert!(split_keywords("   ").is_empty());
    }

    #[test]
    fn test_keyword_pattern_escapes_each_keyword() {
        let pattern = build_keyword_pattern(&["c++", "a.b"], false).unwrap();
        assert!(pattern.is_match("I like C++"));
        assert!(pattern.is_match("a.b"));
        assert!(!pattern.is_match("axb"));
    }

    #[test]
    fn test_keyword_mode_is_or() {
        let m = QueryMatcher::keywords("alpha beta", false).unwrap().unwrap();
        assert!(m.pattern.is_match("only BETA here"));
        assert_eq!(m.pattern.find_iter("alpha beta alpha").count(), 3);
    }

    #[test]
    fn test_case_sensitive_keywords() {
        let m = QueryMatcher::keywords("Rust", true).unwrap().unwrap();
        assert!(m.pattern.is_match("Rust"));
        assert!(!m.pattern.is_match("rust"));
    }

    #[test]
    fn test_regex_mode_uses_raw_pattern() {
        let m = QueryMatcher::regex(r"fo+\d", false).unwrap().unwrap();
        assert!(m.pattern.is_match("FOOO7"));
        assert!(!m.pattern.is_match("fo+\\d"));
    }

    #[test]
    fn test_invalid_regex_is_validation_error() {
        let err = QueryMatcher::regex("(unclosed", false).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidPattern { pattern, .. }) if pattern == "(unclosed"
        ));
    }

    #[test]
    fn test_empty_query_has_no_matcher() {
        assert!(QueryMatcher::keywords("", false).unwrap().is_none());
        assert!(QueryMatcher::regex("", false).unwrap().is_none());
    }

    #[test]
    fn test_score_components() {
        let m = QueryMatcher::keywords("alpha", false).unwrap().unwrap();
        assert!((m.score(2, "nothing", "nothing") - 0.2).abs() < 1e-9);
        assert!((m.score(50, "nothing", "nothing") - 0.4).abs() < 1e-9);
        assert!((m.score(50, "Alpha notes", "alpha again") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_monotonic_in_matched_keywords() {
        let m = QueryMatcher::keywords("alpha beta gamma", false).unwrap().unwrap();
        let one = m.score(3, "alpha", "alpha");
        let two = m.score(3, "alpha beta", "alpha beta");
        let three = m.score(3, "alpha beta gamma", "alpha beta gamma");
        assert!(one <= two && two <= three);
        assert!(one < three);
    }
}
