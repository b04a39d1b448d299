//! Structured search over note contents
//!
//! A query string is parsed into a [`SearchQuery`], its free text compiled
//! into a [`QueryMatcher`], and the [`ContentScanner`] results are filtered
//! by tag and date before scoring.

pub mod keyword;
pub mod query;
pub mod scanner;

pub use keyword::{QueryMatcher, build_keyword_pattern, split_keywords};
pub use query::{SearchQuery, parse_search_query, parse_search_query_at};
pub use scanner::{ContentScanner, ScanMatch, StorageScanner};

use crate::config::SearchConfig;
use anyhow::Result;
use chrono::{DateTime, Local};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::SystemTime;

/// Limits applied to a search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub max_results: usize,
    pub relevance_threshold: f64,
    pub preview_length: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchConfig::default().into()
    }
}

impl From<SearchConfig> for SearchOptions {
    fn from(config: SearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            relevance_threshold: config.relevance_threshold,
            preview_length: config.preview_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub path: PathBuf,
    pub title: String,
    pub score: f64,
    pub match_count: usize,
    pub preview: String,
    pub modified: SystemTime,
    pub tags: Vec<String>,
}

impl SearchResult {
    fn new(found: ScanMatch, score: f64) -> Self {
        Self {
            path: found.path,
            title: found.title,
            score,
            match_count: found.match_count,
            preview: found.preview,
            modified: found.modified,
            tags: found.tags,
        }
    }
}

fn local_time(time: SystemTime) -> chrono::NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Executes [`SearchQuery`]s against a [`ContentScanner`]
pub struct AdvancedSearch {
    scanner: Box<dyn ContentScanner>,
    options: SearchOptions,
}

impl AdvancedSearch {
    pub fn new(scanner: Box<dyn ContentScanner>, options: SearchOptions) -> Self {
        Self { scanner, options }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Parse and run a query string
    pub fn search_str(&self, input: &str) -> Result<Vec<SearchResult>> {
        self.search(&parse_search_query(input))
    }

    /// Run a parsed query
    ///
    /// With free text, results are scored and ordered by score. Once there are
    /// more than `max_results` hits, those under the relevance threshold are
    /// dropped and the rest truncated. With only tag or date filters, every
    /// matching note is returned with score 1.0, newest first. An empty query
    /// returns nothing.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let matcher = if query.use_regex {
            QueryMatcher::regex(&query.query, query.case_sensitive)?
        } else {
            QueryMatcher::keywords(&query.query, query.case_sensitive)?
        };

        if matcher.is_none() && !query.has_filters() {
            return Ok(Vec::new());
        }

        let candidates = self
            .scanner
            .scan(matcher.as_ref().map(|m| &m.pattern), self.options.preview_length)?
            .into_iter()
            .filter(|found| query.tags.iter().all(|tag| found.tags.contains(tag)))
            .filter(|found| query.date_matches(local_time(found.modified)));

        let Some(matcher) = matcher else {
            let mut results: Vec<SearchResult> =
                candidates.map(|found| SearchResult::new(found, 1.0)).collect();
            results.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
            tracing::debug!("Filter-only search matched {} note(s)", results.len());
            return Ok(results);
        };

        let mut results: Vec<SearchResult> = candidates
            .map(|found| {
                let name = format!(
                    "{} {}",
                    found
                        .path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default(),
                    found.title
                );
                let score = matcher.score(found.match_count, &name, &found.preview);
                SearchResult::new(found, score)
            })
            .collect();

        if results.len() > self.options.max_results {
            results.retain(|r| r.score >= self.options.relevance_threshold);
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.modified.cmp(&a.modified))
                .then_with(|| a.path.cmp(&b.path))
        });
        results.truncate(self.options.max_results);

        tracing::debug!("Search for '{}' returned {} result(s)", query.query, results.len());
        Ok(results)
    }
}
