//! Reading and writing the `tags` field of a note's frontmatter
//!
//! Frontmatter is the block delimited by `---` lines at the very start of a
//! note. Only the `tags` and `tagged-at` fields are ever rewritten; every other
//! line of the block and the whole body are carried over verbatim. A block
//! whose closing `---` is missing is not frontmatter at all.
//!
//! The `tags` value is accepted in three encodings:
//!
//! ```text
//! tags: [bug, "urgent"]      inline array
//! tags:                      block list
//!   - bug
//!   - urgent
//! tags: bug, urgent          legacy comma string
//! ```
//!
//! and is always written back as an inline array.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

const DELIMITER: &str = "---";
const TAGS_KEY: &str = "tags";
const TAGGED_AT_KEY: &str = "tagged-at";

/// Where a tag came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub source: TagSource,
    pub confidence: f32,
    pub added_at: Option<DateTime<Utc>>,
}

impl TagEntry {
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: TagSource::Manual,
            confidence: 1.0,
            added_at: None,
        }
    }
}

/// Tags stored in a note's frontmatter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagMetadata {
    pub tags: Vec<TagEntry>,
    /// Value of the `tagged-at` field
    pub last_tagged: Option<DateTime<Utc>>,
}

impl TagMetadata {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: names.into_iter().map(TagEntry::manual).collect(),
            last_tagged: None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

/// A frontmatter block split out of a note
struct Block<'a> {
    /// Lines between the delimiters, without line terminators
    lines: Vec<&'a str>,
    /// Everything after the closing delimiter line
    body: &'a str,
    newline: &'static str,
    /// Whether the closing delimiter line ended with a line terminator
    closed_with_newline: bool,
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

fn split_block(content: &str) -> Option<Block<'_>> {
    let mut raw_lines = content.split_inclusive('\n');

    let first = raw_lines.next()?;
    if strip_terminator(first).trim_end() != DELIMITER || !first.ends_with('\n') {
        return None;
    }
    let newline = if first.ends_with("\r\n") { "\r\n" } else { "\n" };

    let mut offset = first.len();
    let mut lines = Vec::new();
    for raw in raw_lines {
        offset += raw.len();
        let line = strip_terminator(raw);
        if line.trim_end() == DELIMITER {
            return Some(Block {
                lines,
                body: &content[offset..],
                newline,
                closed_with_newline: raw.ends_with('\n'),
            });
        }
        lines.push(line);
    }

    // Unterminated block: not frontmatter
    None
}

fn render_block(block: &Block<'_>, lines: &[String]) -> String {
    let nl = block.newline;
    let mut out = String::with_capacity(block.body.len() + 64);
    out.push_str(DELIMITER);
    out.push_str(nl);
    for line in lines {
        out.push_str(line);
        out.push_str(nl);
    }
    out.push_str(DELIMITER);
    if block.closed_with_newline {
        out.push_str(nl);
    }
    out.push_str(block.body);
    out
}

/// Value text following `key:` when `line` declares that top-level key
fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    let rest = rest.trim_start_matches([' ', '\t']);
    rest.strip_prefix(':').map(str::trim)
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed == "-" || trimmed.starts_with("- ")
}

/// Line range occupied by a top-level field, including block-list items and
/// continuation lines of a multi-line inline array
fn field_span<S: AsRef<str>>(lines: &[S], key: &str) -> Option<Range<usize>> {
    let start = lines
        .iter()
        .position(|l| key_value(l.as_ref(), key).is_some())?;
    let value = key_value(lines[start].as_ref(), key).unwrap_or_default();

    let mut end = start + 1;
    if value.is_empty() {
        while end < lines.len() {
            let line = lines[end].as_ref();
            let indented = line.starts_with([' ', '\t']);
            if line.trim().is_empty() || !(indented || is_list_item(line)) {
                break;
            }
            end += 1;
        }
    } else if value.starts_with('[') && !value.contains(']') {
        while end < lines.len() {
            let closes = lines[end].as_ref().contains(']');
            end += 1;
            if closes {
                break;
            }
        }
    }

    Some(start..end)
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn split_values(list: &str) -> Vec<String> {
    list.split(',')
        .map(unquote)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tag names in a `tags` field, in the order written
fn parse_tag_values<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let Some(first) = lines.first() else {
        return Vec::new();
    };
    let value = key_value(first.as_ref(), TAGS_KEY).unwrap_or_default();

    if value.starts_with('[') {
        let mut joined = value.to_string();
        for line in &lines[1..] {
            joined.push(' ');
            joined.push_str(line.as_ref().trim());
        }
        let inner = joined.trim_start_matches('[');
        let inner = inner.rfind(']').map(|end| &inner[..end]).unwrap_or(inner);
        return split_values(inner);
    }

    if value.is_empty() {
        return lines[1..]
            .iter()
            .filter_map(|line| line.as_ref().trim_start().strip_prefix('-'))
            .map(unquote)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
    }

    split_values(value)
}

fn render_tag(name: &str) -> String {
    if name.contains([',', '[', ']', '"', '#', ':']) {
        format!("\"{}\"", name.replace('"', "'"))
    } else {
        name.to_string()
    }
}

/// True if the note starts with a terminated `---` block
pub fn has_frontmatter(content: &str) -> bool {
    split_block(content).is_some()
}

/// Byte offset at which the note body starts (0 without frontmatter)
pub fn body_start(content: &str) -> usize {
    split_block(content)
        .map(|block| content.len() - block.body.len())
        .unwrap_or(0)
}

/// Unquoted scalar value of a top-level frontmatter field
pub fn field(content: &str, key: &str) -> Option<String> {
    let block = split_block(content)?;
    block
        .lines
        .iter()
        .find_map(|line| key_value(line, key))
        .map(unquote)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read the tags stored in frontmatter
///
/// Missing frontmatter or a missing `tags` field yields empty metadata.
pub fn parse_tags(content: &str) -> TagMetadata {
    let Some(block) = split_block(content) else {
        return TagMetadata::default();
    };

    let tags = field_span(&block.lines, TAGS_KEY)
        .map(|span| parse_tag_values(&block.lines[span]))
        .unwrap_or_default();

    let last_tagged = block
        .lines
        .iter()
        .find_map(|line| key_value(line, TAGGED_AT_KEY))
        .and_then(|value| DateTime::parse_from_rfc3339(unquote(value)).ok())
        .map(|dt| dt.with_timezone(&Utc));

    TagMetadata {
        tags: tags.into_iter().map(TagEntry::manual).collect(),
        last_tagged,
    }
}

/// Write tags into frontmatter, stamping `tagged-at` with the current time
pub fn write_tags(content: &str, metadata: &TagMetadata) -> String {
    write_tags_at(content, metadata, Utc::now())
}

/// Write tags into frontmatter, stamping `tagged-at` with `tagged_at`
///
/// Creates the frontmatter block when missing. An empty tag list removes the
/// field instead of writing `tags: []`.
pub fn write_tags_at(content: &str, metadata: &TagMetadata, tagged_at: DateTime<Utc>) -> String {
    let mut names: Vec<&str> = Vec::new();
    for tag in &metadata.tags {
        let name = tag.name.trim();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }

    if names.is_empty() {
        return remove_tags(content);
    }

    let tags_line = format!(
        "{}: [{}]",
        TAGS_KEY,
        names
            .iter()
            .map(|n| render_tag(n))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let stamp_line = format!(
        "{}: {}",
        TAGGED_AT_KEY,
        tagged_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let Some(block) = split_block(content) else {
        return format!("{DELIMITER}\n{tags_line}\n{stamp_line}\n{DELIMITER}\n{content}");
    };

    let mut lines: Vec<String> = block.lines.iter().map(|l| l.to_string()).collect();
    if let Some(span) = field_span(&lines, TAGGED_AT_KEY) {
        lines.drain(span);
    }
    match field_span(&lines, TAGS_KEY) {
        Some(span) => {
            lines.splice(span, [tags_line, stamp_line]);
        }
        None => {
            lines.push(tags_line);
            lines.push(stamp_line);
        }
    }

    render_block(&block, &lines)
}

/// Remove the `tags` field (and its `tagged-at` stamp)
///
/// Returns the content untouched when there is no frontmatter or no `tags`
/// field. A block left empty by the removal is dropped entirely.
pub fn remove_tags(content: &str) -> String {
    let Some(block) = split_block(content) else {
        return content.to_string();
    };
    if field_span(&block.lines, TAGS_KEY).is_none() {
        return content.to_string();
    }

    let mut lines: Vec<String> = block.lines.iter().map(|l| l.to_string()).collect();
    for key in [TAGS_KEY, TAGGED_AT_KEY] {
        if let Some(span) = field_span(&lines, key) {
            lines.drain(span);
        }
    }

    if lines.iter().all(|l| l.trim().is_empty()) {
        return block
            .body
            .strip_prefix(block.newline)
            .unwrap_or(block.body)
            .to_string();
    }

    render_block(&block, &lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_has_frontmatter() {
        assert!(has_frontmatter("---\ntitle: x\n---\nbody"));
        assert!(has_frontmatter("---\n---\n"));
        assert!(!has_frontmatter("# Title\n---\nfoo\n---\n"));
        assert!(!has_frontmatter("---\ntitle: unterminated\n\nbody"));
        assert!(!has_frontmatter(""));
    }

    #[test]
    fn test_parse_inline_array() {
        let meta = parse_tags("---\ntags: [bug, \"urgent\" ,  'needs-review']\n---\nBody");
        assert_eq!(meta.names(), vec!["bug", "urgent", "needs-review"]);
        assert!(meta.tags.iter().all(|t| t.source == TagSource::Manual));
        assert!(meta.tags.iter().all(|t| t.confidence == 1.0));
    }

    #[test]
    fn test_parse_block_list() {
        let content = r#"---
title: Weekly review
tags:
  - bug
  - "urgent"
status: open
---
Body"#;
        let meta = parse_tags(content);
        assert_eq!(meta.names(), vec!["bug", "urgent"]);
    }

    #[test]
    fn test_parse_comma_string() {
        let meta = parse_tags("---\ntags: bug, urgent\n---\n");
        assert_eq!(meta.names(), vec!["bug", "urgent"]);
    }

    #[test]
    fn test_parse_multiline_inline_array() {
        let meta = parse_tags("---\ntags: [bug,\n  urgent]\nstatus: open\n---\n");
        assert_eq!(meta.names(), vec!["bug", "urgent"]);
    }

    #[test]
    fn test_parse_missing_tags_is_empty() {
        assert!(parse_tags("No frontmatter here").tags.is_empty());
        assert!(parse_tags("---\ntitle: x\n---\n").tags.is_empty());
        assert!(parse_tags("---\ntags: [bug]\nunterminated").tags.is_empty());
    }

    #[test]
    fn test_parse_tagged_at() {
        let meta = parse_tags("---\ntags: [a]\ntagged-at: 2025-10-01T12:00:00Z\n---\n");
        assert_eq!(meta.last_tagged, Some(stamp()));
    }

    #[test]
    fn test_write_prepends_frontmatter() {
        let out = write_tags_at(
            "# Title\n\nBody",
            &TagMetadata::from_names(["bug", "urgent"]),
            stamp(),
        );
        assert_eq!(
            out,
            "---\ntags: [bug, urgent]\ntagged-at: 2025-10-01T12:00:00Z\n---\n# Title\n\nBody"
        );
    }

    #[test]
    fn test_write_preserves_other_fields_in_order() {
        let content = "---\ntitle: Plan\ntags:\n  - old\nstatus: open\n---\n\nBody\n";
        let out = write_tags_at(content, &TagMetadata::from_names(["new"]), stamp());
        assert_eq!(
            out,
            "---\ntitle: Plan\ntags: [new]\ntagged-at: 2025-10-01T12:00:00Z\nstatus: open\n---\n\nBody\n"
        );
    }

    #[test]
    fn test_write_appends_when_no_tags_field() {
        let content = "---\ntitle: Plan\n---\nBody";
        let out = write_tags_at(content, &TagMetadata::from_names(["a"]), stamp());
        assert_eq!(
            out,
            "---\ntitle: Plan\ntags: [a]\ntagged-at: 2025-10-01T12:00:00Z\n---\nBody"
        );
    }

    #[test]
    fn test_write_is_idempotent() {
        let meta = TagMetadata::from_names(["bug", "urgent"]);
        let once = write_tags_at("---\ntitle: x\n---\nBody", &meta, stamp());
        let twice = write_tags_at(&once, &meta, stamp());
        assert_eq!(once, twice);
        assert_eq!(twice.matches("tags:").count(), 1);
        assert_eq!(twice.matches("tagged-at:").count(), 1);
    }

    #[test]
    fn test_write_empty_list_removes_field() {
        let content = "---\ntitle: x\ntags: [a]\ntagged-at: 2025-01-01T00:00:00Z\n---\nBody";
        let out = write_tags_at(content, &TagMetadata::default(), stamp());
        assert_eq!(out, "---\ntitle: x\n---\nBody");
    }

    #[test]
    fn test_write_preserves_crlf() {
        let content = "---\r\ntitle: x\r\n---\r\nBody";
        let out = write_tags_at(content, &TagMetadata::from_names(["a"]), stamp());
        assert_eq!(
            out,
            "---\r\ntitle: x\r\ntags: [a]\r\ntagged-at: 2025-10-01T12:00:00Z\r\n---\r\nBody"
        );
    }

    #[test]
    fn test_remove_tags_noop_without_field() {
        let content = "---\ntitle: x\n---\nBody";
        assert_eq!(remove_tags(content), content);
        assert_eq!(remove_tags("plain body"), "plain body");
    }

    #[test]
    fn test_remove_tags_drops_empty_block() {
        let content = "---\ntags: [bug, urgent]\n---\n\nContent";
        assert_eq!(remove_tags(content), "Content");
    }

    #[test]
    fn test_remove_block_list() {
        let content = "---\ntags:\n- a\n- b\nauthor: me\n---\nBody";
        assert_eq!(remove_tags(content), "---\nauthor: me\n---\nBody");
    }

    #[test]
    fn test_field_and_body_start() {
        let content = "---\ntitle: \"Quoted Title\"\n---\nBody";
        assert_eq!(field(content, "title").as_deref(), Some("Quoted Title"));
        assert_eq!(field(content, "missing"), None);
        assert_eq!(&content[body_start(content)..], "Body");
        assert_eq!(body_start("Body"), 0);
    }
}
