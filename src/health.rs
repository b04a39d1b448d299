//! Health check module for analyzing notes
//!
//! This module checks a note collection for common issues such as links to
//! notes that do not exist yet, untagged or orphaned notes, and frontmatter
//! tags that do not follow the tag grammar.

use crate::frontmatter;
use crate::link::{LinkService, extract_links};
use crate::repository::{Repository, link_target};
use crate::tags::{extract_tags_from_content, is_valid_tag, normalize_tag};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Results of a health check operation
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    /// Placeholder link targets: source note -> unresolved targets
    pub placeholders: BTreeMap<PathBuf, Vec<String>>,
    /// Notes without any tags
    pub notes_without_tags: Vec<PathBuf>,
    /// Orphaned notes (no backlinks, no resolved outgoing links and no tags)
    pub orphaned_notes: Vec<PathBuf>,
    /// Frontmatter tags invalid even after normalization: note -> raw tags
    pub invalid_tags: BTreeMap<PathBuf, Vec<String>>,
}

impl HealthReport {
    /// Check if the report has any issues
    pub fn has_issues(&self) -> bool {
        !self.placeholders.is_empty()
            || !self.notes_without_tags.is_empty()
            || !self.orphaned_notes.is_empty()
            || !self.invalid_tags.is_empty()
    }

    /// Count total number of issues
    pub fn issue_count(&self) -> usize {
        self.placeholders.len()
            + self.notes_without_tags.len()
            + self.orphaned_notes.len()
            + self.invalid_tags.len()
    }
}

/// Run health checks on every note
///
/// `links` must hold a built backlinks index.
pub(crate) fn check_health(repo: &Repository, links: &LinkService) -> Result<HealthReport> {
    let resolver = repo.resolver()?;
    let mut report = HealthReport::default();

    for path in repo.note_paths()? {
        let content = match repo.read_note(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping unreadable note {}: {:#}", path.display(), e);
                continue;
            }
        };

        let mut missing: Vec<String> = Vec::new();
        let mut resolved_outgoing = false;
        for link in extract_links(&content) {
            if resolver.resolve(&link.link_text, Some(&path)).is_some() {
                resolved_outgoing = true;
            } else {
                let target = link_target(&link.link_text);
                if target.is_empty() || missing.iter().any(|m| m.eq_ignore_ascii_case(target)) {
                    continue;
                }
                missing.push(target.to_string());
            }
        }

        let has_tags = !extract_tags_from_content(&content).is_empty();
        if !has_tags {
            report.notes_without_tags.push(path.clone());
            if !resolved_outgoing && links.get_backlinks(&path).is_empty() {
                report.orphaned_notes.push(path.clone());
            }
        }

        let invalid: Vec<String> = frontmatter::parse_tags(&content)
            .tags
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| !is_valid_tag(&normalize_tag(name)))
            .collect();
        if !invalid.is_empty() {
            report.invalid_tags.insert(path.clone(), invalid);
        }

        if !missing.is_empty() {
            report.placeholders.insert(path, missing);
        }
    }

    tracing::info!("Health check found {} issue(s)", report.issue_count());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::storage::{MemoryStorage, Storage};
    use std::path::Path;
    use std::sync::Arc;

    fn check(files: &[(&str, &str)]) -> HealthReport {
        let storage = MemoryStorage::new();
        for (path, content) in files {
            storage.write(Path::new(path), content).unwrap();
        }
        let repo = Repository::new(Arc::new(storage), Arc::new(LibraryConfig::default()));
        let mut links = LinkService::new(repo.clone());
        links.build_backlinks_index().unwrap();
        check_health(&repo, &links).unwrap()
    }

    #[test]
    fn test_health_check_no_issues() {
        let report = check(&[
            (
                "note1.md",
                r#"---
tags: [test]
---

# Note 1

Content with [[note2]] link"#,
            ),
            (
                "note2.md",
                r#"---
tags: [test]
---

# Note 2

Content"#,
            ),
        ]);

        assert!(!report.has_issues());
        assert_eq!(report.issue_count(), 0);
    }

    #[test]
    fn test_health_check_placeholders() {
        let report = check(&[(
            "note1.md",
            "#test\n\n[[Missing Note]] and [[missing note#Intro]] and [[Other]]",
        )]);

        assert!(report.has_issues());
        assert_eq!(
            report.placeholders[Path::new("note1.md")],
            vec!["Missing Note", "Other"]
        );
    }

    #[test]
    fn test_health_check_untagged_and_orphaned() {
        let report = check(&[
            ("linked.md", "# Linked\n\nNo tags here"),
            ("linker.md", "# Linker\n\nSee [[linked]]"),
            ("alone.md", "# Alone\n\nNothing"),
            ("tagged.md", "# Tagged #topic"),
        ]);

        assert_eq!(
            report.notes_without_tags,
            vec![
                PathBuf::from("alone.md"),
                PathBuf::from("linked.md"),
                PathBuf::from("linker.md"),
            ]
        );
        assert_eq!(report.orphaned_notes, vec![PathBuf::from("alone.md")]);
    }

    #[test]
    fn test_health_check_invalid_frontmatter_tags() {
        let report = check(&[(
            "note1.md",
            "---\ntags: [good, Bad_Tag, 9lives]\n---\n\n# Note",
        )]);

        assert_eq!(
            report.invalid_tags[Path::new("note1.md")],
            vec!["Bad_Tag", "9lives"]
        );
    }
}
