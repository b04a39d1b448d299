//! Placeholders: links whose target note does not exist yet

use crate::link::{Link, extract_links};
use crate::repository::{LinkResolver, Repository, link_target};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Characters of surrounding text kept on each side of a placeholder link
const CONTEXT_RADIUS: usize = 40;

/// One occurrence of a placeholder link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderSource {
    pub file: PathBuf,
    /// Zero-based line number
    pub line: usize,
    /// Surrounding text, including the raw `[[...]]`
    pub context: String,
}

/// Every reference to one missing target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Target as first written, without any `#section` suffix
    pub link_text: String,
    pub display_text: Option<String>,
    pub sources: Vec<PlaceholderSource>,
}

/// A single (placeholder, source) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderOccurrence {
    pub link_text: String,
    pub display_text: Option<String>,
    pub source: PlaceholderSource,
}

/// Grouping key: the link target, trimmed and lowercased
pub fn placeholder_key(link_text: &str) -> String {
    link_target(link_text).to_lowercase()
}

/// Text around `[start, end)` of `line`, on char boundaries
fn context(line: &str, start: usize, end: usize) -> String {
    let before = line[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_RADIUS - 1)
        .map_or(0, |(i, _)| i);
    let after = line[end..]
        .char_indices()
        .nth(CONTEXT_RADIUS)
        .map_or(line.len(), |(i, _)| end + i);
    line[before..after].trim().to_string()
}

fn occurrences_in(
    path: &Path,
    content: &str,
    resolver: &LinkResolver,
) -> Vec<PlaceholderOccurrence> {
    let lines: Vec<&str> = content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    extract_links(content)
        .into_iter()
        .filter(|link| !placeholder_key(&link.link_text).is_empty())
        .filter(|link| resolver.resolve(&link.link_text, Some(path)).is_none())
        .map(|link: Link| {
            let line = lines.get(link.range.line).copied().unwrap_or_default();
            PlaceholderOccurrence {
                link_text: link_target(&link.link_text).to_string(),
                display_text: link.display_text,
                source: PlaceholderSource {
                    file: path.to_path_buf(),
                    line: link.range.line,
                    context: context(line, link.range.start_col, link.range.end_col),
                },
            }
        })
        .collect()
}

/// Re-derives placeholders from a fresh corpus scan on every call
pub struct PlaceholdersService {
    repo: Repository,
}

impl PlaceholdersService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Every placeholder occurrence in the corpus, in note order
    pub fn get_all_placeholders_flat(&self) -> Result<Vec<PlaceholderOccurrence>> {
        let resolver = self.repo.resolver()?;
        let mut found = Vec::new();

        for path in self.repo.note_paths()? {
            match self.repo.read_note(&path) {
                Ok(content) => found.extend(occurrences_in(&path, &content, &resolver)),
                Err(e) => tracing::warn!("Skipping unreadable note {}: {:#}", path.display(), e),
            }
        }

        Ok(found)
    }

    /// Placeholders grouped by [`placeholder_key`]
    ///
    /// Repeated references, even within one file, each add a source.
    pub fn get_all_placeholders(&self) -> Result<BTreeMap<String, Placeholder>> {
        let mut grouped: BTreeMap<String, Placeholder> = BTreeMap::new();

        for occurrence in self.get_all_placeholders_flat()? {
            grouped
                .entry(placeholder_key(&occurrence.link_text))
                .or_insert_with(|| Placeholder {
                    link_text: occurrence.link_text.clone(),
                    display_text: occurrence.display_text.clone(),
                    sources: Vec::new(),
                })
                .sources
                .push(occurrence.source);
        }

        tracing::debug!("Found {} placeholder target(s)", grouped.len());
        Ok(grouped)
    }

    pub fn get_placeholders_in_file(&self, path: &Path) -> Result<Vec<PlaceholderOccurrence>> {
        let resolver = self.repo.resolver()?;
        let content = self.repo.read_note(path)?;
        Ok(occurrences_in(path, &content, &resolver))
    }

    /// Distinct missing targets, as first written
    pub fn get_placeholder_targets(&self) -> Result<Vec<String>> {
        Ok(self
            .get_all_placeholders()?
            .into_values()
            .map(|p| p.link_text)
            .collect())
    }

    /// Number of references to each missing target
    pub fn get_placeholder_counts(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self
            .get_all_placeholders()?
            .into_values()
            .map(|p| (p.link_text, p.sources.len()))
            .collect())
    }

    /// True if `link_text` does not resolve to an existing note
    pub fn is_placeholder(&self, link_text: &str) -> Result<bool> {
        Ok(self.repo.resolve_link(link_text, None)?.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn service(files: &[(&str, &str)]) -> PlaceholdersService {
        let storage = MemoryStorage::new();
        for (path, content) in files {
            storage.write(Path::new(path), content).unwrap();
        }
        PlaceholdersService::new(Repository::new(
            Arc::new(storage),
            Arc::new(LibraryConfig::default()),
        ))
    }

    #[test]
    fn test_repeated_placeholder_in_one_file_groups() {
        let placeholders = service(&[(
            "a.md",
            "[[missing]] first\nthen [[missing]] and [[Missing|again]]",
        )]);

        let all = placeholders.get_all_placeholders().unwrap();
        assert_eq!(all.len(), 1);
        let missing = &all["missing"];
        assert_eq!(missing.link_text, "missing");
        assert_eq!(missing.sources.len(), 3);
        assert_eq!(missing.sources[1].line, 1);
    }

    #[test]
    fn test_existing_targets_are_not_placeholders() {
        let placeholders = service(&[
            ("a.md", "[[b]] [[2025/10-October/standup]] [[Idea#Section]]"),
            ("b.md", ""),
            ("2025/10-October/standup.md", ""),
        ]);

        let targets = placeholders.get_placeholder_targets().unwrap();
        assert_eq!(targets, vec!["Idea"]);

        assert!(!placeholders.is_placeholder("b").unwrap());
        assert!(!placeholders.is_placeholder("2025/10-October/standup").unwrap());
        assert!(placeholders.is_placeholder("2025/11-November/standup").unwrap());
    }

    #[test]
    fn test_flat_and_counts() {
        let placeholders = service(&[
            ("a.md", "[[x]] [[y]]"),
            ("b.md", "[[x]]"),
        ]);

        let flat = placeholders.get_all_placeholders_flat().unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[2].source.file, PathBuf::from("b.md"));

        let counts = placeholders.get_placeholder_counts().unwrap();
        assert_eq!(counts["x"], 2);
        assert_eq!(counts["y"], 1);
    }

    #[test]
    fn test_placeholders_in_file() {
        let placeholders = service(&[("a.md", "[[x]]"), ("b.md", "[[a]] [[z|Zed]]")]);
        let in_b = placeholders
            .get_placeholders_in_file(Path::new("b.md"))
            .unwrap();
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].link_text, "z");
        assert_eq!(in_b[0].display_text.as_deref(), Some("Zed"));
    }

    #[test]
    fn test_context_contains_raw_link() {
        let long = format!("{} see [[gap]] {}", "a".repeat(80), "b".repeat(80));
        let placeholders = service(&[("a.md", long.as_str())]);
        let flat = placeholders.get_all_placeholders_flat().unwrap();
        let context = &flat[0].source.context;
        assert!(context.contains("[[gap]]"));
        assert!(context.len() < long.len());
        assert!(context.starts_with('a'));
        assert!(context.ends_with('b'));
    }
}
