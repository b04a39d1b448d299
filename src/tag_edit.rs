//! Bulk tag rename, merge and delete across notes
//!
//! Edits are applied note by note. A note that fails to read or write is
//! reported and skipped; notes already rewritten stay rewritten.

use crate::error::{Error, FileFailure};
use crate::frontmatter::{self, TagEntry, TagMetadata};
use crate::repository::Repository;
use crate::tag_index::TagService;
use crate::tags::{extract_tags_from_content, inline_tags, is_valid_tag, normalize_tag};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::path::PathBuf;

/// What a rename would touch, computed before any file changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub old_tag: String,
    pub new_tag: String,
    pub notes: Vec<PathBuf>,
    /// The new tag is already in use, so the rename is really a merge
    pub target_exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEditReport {
    pub notes_updated: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

impl TagEditReport {
    pub fn notes_updated_count(&self) -> usize {
        self.notes_updated.len()
    }
}

/// Replace (or with `new_tag == None`, remove) `old_tag` in one note
///
/// Frontmatter entries are rewritten and deduplicated. Inline `#old` tokens
/// become `#new`, unless the note already carries `new`, in which case they
/// are removed; a line left blank by a removal is dropped.
pub fn retag_content(
    content: &str,
    old_tag: &str,
    new_tag: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let has_new = new_tag.is_some_and(|new| {
        extract_tags_from_content(content)
            .iter()
            .any(|tag| tag == new)
    });
    let replacement = if has_new { None } else { new_tag };

    let mut updated = retag_frontmatter(content, old_tag, new_tag, now);

    let body_start = frontmatter::body_start(&updated);
    let body = retag_inline(&updated[body_start..], old_tag, replacement);
    updated.truncate(body_start);
    updated.push_str(&body);
    updated
}

fn retag_frontmatter(
    content: &str,
    old_tag: &str,
    new_tag: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let parsed = frontmatter::parse_tags(content);
    if !parsed
        .tags
        .iter()
        .any(|entry| normalize_tag(&entry.name) == old_tag)
    {
        return content.to_string();
    }

    let mut kept: Vec<TagEntry> = Vec::with_capacity(parsed.tags.len());
    for mut entry in parsed.tags {
        let name = normalize_tag(&entry.name);
        let name = if name == old_tag {
            match new_tag {
                Some(new) => new.to_string(),
                None => continue,
            }
        } else {
            name
        };
        if kept.iter().any(|k| k.name == name) {
            continue;
        }
        entry.name = name;
        kept.push(entry);
    }

    let metadata = TagMetadata {
        tags: kept,
        last_tagged: Some(now),
    };
    frontmatter::write_tags_at(content, &metadata, now)
}

/// Extend a token removal over one adjacent space so words stay separated
fn removal_range(line: &str, token: Range<usize>) -> Range<usize> {
    let before = line[..token.start].chars().next_back();
    let after = line[token.end..].chars().next();
    match (before, after) {
        (Some(' ' | '\t'), _) => token.start - 1..token.end,
        (_, Some(' ' | '\t')) => token.start..token.end + 1,
        _ => token,
    }
}

fn retag_inline(body: &str, old_tag: &str, new_tag: Option<&str>) -> String {
    let matches: Vec<Range<usize>> = inline_tags(body)
        .into_iter()
        .filter(|tag| normalize_tag(tag.name) == old_tag)
        .map(|tag| tag.range)
        .collect();
    if matches.is_empty() {
        return body.to_string();
    }

    let mut output = String::with_capacity(body.len());
    let mut pending = matches.iter().peekable();
    let mut offset = 0;

    for raw in body.split_inclusive('\n') {
        let line_end = offset + raw.len();
        let mut line = String::with_capacity(raw.len());
        let mut last = 0;
        let mut removed = false;

        while let Some(range) = pending.next_if(|r| r.start < line_end) {
            let local = range.start - offset..range.end - offset;
            match new_tag {
                Some(new) => {
                    line.push_str(&raw[last..local.start]);
                    line.push('#');
                    line.push_str(new);
                    last = local.end;
                }
                None => {
                    let cut = removal_range(raw, local);
                    line.push_str(&raw[last..cut.start.max(last)]);
                    last = cut.end.max(last);
                    removed = true;
                }
            }
        }
        line.push_str(&raw[last..]);

        if !(removed && line.trim().is_empty()) {
            output.push_str(&line);
        }
        offset = line_end;
    }

    output
}

/// Applies tag rename, merge and delete to the notes the tag index lists
///
/// The index is read, never updated; rebuild it after an edit.
pub struct TagEditor {
    repo: Repository,
}

impl TagEditor {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    fn validated(tag: &str) -> Result<String> {
        let normalized = normalize_tag(tag);
        if !is_valid_tag(&normalized) {
            return Err(Error::InvalidTag(tag.trim().to_string()).into());
        }
        Ok(normalized)
    }

    /// Validate a rename and list the notes it would change
    pub fn plan_rename(&self, index: &TagService, old_tag: &str, new_tag: &str) -> Result<RenamePlan> {
        let new_tag = Self::validated(new_tag)?;
        let old_tag = normalize_tag(old_tag);
        Ok(RenamePlan {
            notes: index.get_notes_with_tag(&old_tag),
            target_exists: old_tag != new_tag && index.has_tag(&new_tag),
            old_tag,
            new_tag,
        })
    }

    /// Rename `old_tag` to `new_tag` everywhere; merges if `new_tag` exists
    pub fn rename_tag(&self, index: &TagService, old_tag: &str, new_tag: &str) -> Result<TagEditReport> {
        let plan = self.plan_rename(index, old_tag, new_tag)?;
        if plan.old_tag == plan.new_tag {
            return Ok(TagEditReport::default());
        }
        let report = self.apply(&plan.notes, &plan.old_tag, Some(&plan.new_tag));
        tracing::info!(
            "Renamed tag '{}' to '{}' in {} note(s)",
            plan.old_tag,
            plan.new_tag,
            report.notes_updated_count()
        );
        Ok(report)
    }

    /// Fold `from_tag` into `into_tag`: every note with `from_tag` ends up
    /// with exactly one `into_tag` and no `from_tag`
    pub fn merge_tags(&self, index: &TagService, into_tag: &str, from_tag: &str) -> Result<TagEditReport> {
        let into_tag = Self::validated(into_tag)?;
        let from_tag = normalize_tag(from_tag);
        if into_tag == from_tag {
            return Err(Error::SameTag(into_tag).into());
        }

        let notes = index.get_notes_with_tag(&from_tag);
        let report = self.apply(&notes, &from_tag, Some(&into_tag));
        tracing::info!(
            "Merged tag '{}' into '{}' in {} note(s)",
            from_tag,
            into_tag,
            report.notes_updated_count()
        );
        Ok(report)
    }

    /// Remove `tag` from every note carrying it
    pub fn delete_tag(&self, index: &TagService, tag: &str) -> Result<TagEditReport> {
        let tag = normalize_tag(tag);
        let notes = index.get_notes_with_tag(&tag);
        let report = self.apply(&notes, &tag, None);
        tracing::info!(
            "Deleted tag '{}' from {} note(s)",
            tag,
            report.notes_updated_count()
        );
        Ok(report)
    }

    fn apply(&self, notes: &[PathBuf], old_tag: &str, new_tag: Option<&str>) -> TagEditReport {
        let mut report = TagEditReport::default();
        let now = Utc::now();

        for path in notes {
            let result = self.repo.read_note(path).and_then(|content| {
                let updated = retag_content(&content, old_tag, new_tag, now);
                if updated == content {
                    return Ok(false);
                }
                self.repo.storage().write(path, &updated)?;
                Ok(true)
            });

            match result {
                Ok(true) => {
                    tracing::debug!("Retagged {}", path.display());
                    report.notes_updated.push(path.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to update tags in {}: {:#}", path.display(), e);
                    report.failures.push(FileFailure::new(path.clone(), &e));
                }
            }
        }

        report
    }
}
