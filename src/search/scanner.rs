//! Content scanning for search

use crate::frontmatter;
use crate::repository::{Repository, note_title};
use crate::tags::extract_tags_from_content;
use anyhow::Result;
use regex::Regex;
use std::path::PathBuf;
use std::time::SystemTime;

/// A note as seen by the scanner
#[derive(Debug, Clone, PartialEq)]
pub struct ScanMatch {
    pub path: PathBuf,
    pub title: String,
    pub match_count: usize,
    pub preview: String,
    pub modified: SystemTime,
    pub tags: Vec<String>,
}

/// Source of per-note match data for [`super::AdvancedSearch`]
pub trait ContentScanner {
    /// Notes matching `pattern`, or every note when `pattern` is `None`
    fn scan(&self, pattern: Option<&Regex>, preview_length: usize) -> Result<Vec<ScanMatch>>;
}

/// Scans the notes of a [`Repository`]
pub struct StorageScanner {
    repo: Repository,
}

impl StorageScanner {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

/// Up to `max_chars` characters starting at byte `from`
fn take_chars(text: &str, from: usize, max_chars: usize) -> &str {
    let rest = &text[from..];
    let end = rest
        .char_indices()
        .nth(max_chars)
        .map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}

/// Snippet of the line holding the first match, or the start of the body
pub fn preview(body: &str, pattern: Option<&Regex>, preview_length: usize) -> String {
    let Some(found) = pattern.and_then(|p| p.find(body)) else {
        let first_line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
        return take_chars(first_line, 0, preview_length).to_string();
    };

    let line_start = body[..found.start()].rfind('\n').map_or(0, |i| i + 1);
    let line_end = body[found.start()..]
        .find('\n')
        .map_or(body.len(), |i| found.start() + i);
    let line = &body[line_start..line_end];
    let match_offset = found.start() - line_start;

    // Keep some text before the match when the line is long
    let lead = preview_length / 4;
    let start = line[..match_offset]
        .char_indices()
        .rev()
        .nth(lead.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    let start = if lead == 0 { match_offset } else { start };

    take_chars(line, start, preview_length).trim().to_string()
}

impl ContentScanner for StorageScanner {
    fn scan(&self, pattern: Option<&Regex>, preview_length: usize) -> Result<Vec<ScanMatch>> {
        let mut matches = Vec::new();

        for path in self.repo.note_paths()? {
            let content = match self.repo.read_note(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable note {}: {:#}", path.display(), e);
                    continue;
                }
            };

            let match_count = pattern.map_or(0, |p| p.find_iter(&content).count());
            if pattern.is_some() && match_count == 0 {
                continue;
            }

            let modified = match self.repo.storage().metadata(&path) {
                Ok(stats) => stats.modified,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {:#}", path.display(), e);
                    continue;
                }
            };

            let body = &content[frontmatter::body_start(&content)..];
            matches.push(ScanMatch {
                title: note_title(&path, &content),
                preview: preview(body, pattern, preview_length),
                tags: extract_tags_from_content(&content),
                match_count,
                modified,
                path,
            });
        }

        Ok(matches)
    }
}
