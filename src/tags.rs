//! Tag extraction, validation and normalization
//!
//! Tag identity is the storage form: trimmed, lowercase, no `#`. The display
//! form always carries a single leading `#`.

use crate::frontmatter;
use std::ops::Range;

/// True if `tag` is a valid storage-form tag
///
/// Lowercase letter first, then lowercase letters and digits, optionally
/// separated by single hyphens (no leading, trailing or doubled hyphens).
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    let mut previous_hyphen = false;
    for c in chars {
        match c {
            'a'..='z' | '0'..='9' => previous_hyphen = false,
            '-' if !previous_hyphen => previous_hyphen = true,
            _ => return false,
        }
    }
    !previous_hyphen
}

/// `#`-prefixed form for display; already-prefixed input is returned unchanged
pub fn format_tag_for_display(tag: &str) -> String {
    if tag.starts_with('#') {
        tag.to_string()
    } else {
        format!("#{}", tag)
    }
}

/// Storage form: trimmed, leading `#` stripped, lowercased
pub fn format_tag_for_storage(tag: &str) -> String {
    tag.trim().trim_start_matches('#').trim().to_lowercase()
}

/// Same contract as [`format_tag_for_storage`]
pub fn normalize_tag(tag: &str) -> String {
    format_tag_for_storage(tag)
}

/// A `#tag` token found in note text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineTag<'a> {
    /// Byte range of the token including the `#`
    pub range: Range<usize>,
    /// Token text without the `#`, as written
    pub name: &'a str,
}

/// A token ends at the first character outside `[A-Za-z0-9-]`
fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | '[' | '{' | ',' | ';'),
    }
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Scan one line outside code fences, skipping inline code spans
fn scan_line<'a>(line: &'a str, offset: usize, found: &mut Vec<InlineTag<'a>>) {
    let mut in_code = false;
    let mut previous: Option<char> = None;
    let mut iter = line.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if c == '`' {
            in_code = !in_code;
        } else if c == '#'
            && !in_code
            && is_boundary(previous)
            && iter.peek().is_some_and(|(_, next)| next.is_ascii_alphabetic())
        {
            let start = i + 1;
            let mut end = start;
            while let Some(&(j, next)) = iter.peek() {
                if !is_tag_char(next) {
                    break;
                }
                end = j + next.len_utf8();
                iter.next();
            }
            found.push(InlineTag {
                range: offset + i..offset + end,
                name: &line[start..end],
            });
            previous = line[..end].chars().next_back();
            continue;
        }
        previous = Some(c);
    }
}

/// Every `#tag` token in `text`, outside fenced and inline code
///
/// A token must follow whitespace, an opening bracket, a comma or the start
/// of a line, and start with a letter, so headings, URL fragments and
/// `[[note#section]]` anchors are not tags.
pub fn inline_tags(text: &str) -> Vec<InlineTag<'_>> {
    let mut found = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\r', '\n']);
        if is_fence(line) {
            in_fence = !in_fence;
        } else if !in_fence {
            scan_line(line, offset, &mut found);
        }
        offset += raw.len();
    }

    found
}

fn push_unique(tags: &mut Vec<String>, candidate: &str) {
    let tag = normalize_tag(candidate);
    if is_valid_tag(&tag) && !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// All valid tags of a note: frontmatter tags first, then inline `#tags`
///
/// Unique, in first-seen order. Invalid candidates are dropped silently.
pub fn extract_tags_from_content(content: &str) -> Vec<String> {
    let mut tags = Vec::new();

    for entry in frontmatter::parse_tags(content).tags {
        push_unique(&mut tags, &entry.name);
    }

    let body = &content[frontmatter::body_start(content)..];
    for inline in inline_tags(body) {
        push_unique(&mut tags, inline.name);
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_tag() {
        for tag in ["bug", "a", "q3-planning", "v2", "multi-part-tag"] {
            assert!(is_valid_tag(tag), "{tag} should be valid");
        }
        for tag in [
            "", "Bug", "2fa", "-bug", "bug-", "bug--fix", "bug_fix", "#bug", "a b", "caf\u{e9}",
        ] {
            assert!(!is_valid_tag(tag), "{tag} should be invalid");
        }
    }

    #[test]
    fn test_format_tag_for_display() {
        assert_eq!(format_tag_for_display("bug"), "#bug");
        assert_eq!(format_tag_for_display("#bug"), "#bug");
    }

    #[test]
    fn test_format_tag_for_storage_is_idempotent() {
        for raw in ["Bug", "#bug", " bug ", "  #URGENT"] {
            let once = format_tag_for_storage(raw);
            assert_eq!(format_tag_for_storage(&once), once);
        }
        assert_eq!(format_tag_for_storage(" #Bug "), "bug");
        assert_eq!(normalize_tag("Bug"), "bug");
    }

    #[test]
    fn test_inline_tags_boundaries() {
        let text = "Fix #bug now (#urgent) but not foo#bar or http://x.io/#frag\n## Heading\n[[note#section]] #2fa";
        let names: Vec<&str> = inline_tags(text).iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["bug", "urgent"]);
    }

    #[test]
    fn test_inline_tags_stop_outside_grammar() {
        let text = "#bug_fix #area/ui #Draft. #v2-beta!";
        let names: Vec<&str> = inline_tags(text).iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["bug", "area", "Draft", "v2-beta"]);
        assert_eq!(
            extract_tags_from_content(text),
            vec!["bug", "area", "draft", "v2-beta"]
        );
    }

    #[test]
    fn test_inline_tags_skip_code() {
        let text = "`#notatag` #real\n```\n#fenced\n```\n#after";
        let names: Vec<&str> = inline_tags(text).iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["real", "after"]);
    }

    #[test]
    fn test_inline_tag_ranges() {
        let text = "a #bug\n#two";
        let tags = inline_tags(text);
        assert_eq!(&text[tags[0].range.clone()], "#bug");
        assert_eq!(&text[tags[1].range.clone()], "#two");
    }

    #[test]
    fn test_extract_tags_union_first_seen() {
        let content = r#"---
tags: [ Bug ,  "urgent", 'bad tag' ]
---

Body mentions #urgent, #feature and #Bug again.
Also #trailing- and #ok-tag."#;
        assert_eq!(
            extract_tags_from_content(content),
            vec!["bug", "urgent", "feature", "ok-tag"]
        );
    }

    #[test]
    fn test_extract_tags_without_frontmatter() {
        assert_eq!(
            extract_tags_from_content("# Title\n\nA #draft note"),
            vec!["draft"]
        );
        assert!(extract_tags_from_content("").is_empty());
    }
}
