//! Wiki-style links: extraction, backlinks index and rename rewriting

use crate::error::FileFailure;
use crate::repository::{LinkResolver, Repository, link_target, path_key, path_without_extension};
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

/// Position of a `[[...]]` occurrence
///
/// `line` is zero-based; columns are byte offsets into that line, with
/// `end_col` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRange {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

/// A `[[target]]` or `[[target|Display]]` link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub link_text: String,
    pub display_text: Option<String>,
    pub range: LinkRange,
}

/// A link into some note, recorded under the note it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlink {
    pub source_file: PathBuf,
    pub link_text: String,
    pub display_text: Option<String>,
    pub line: usize,
}

/// A link leaving a note, with its target if it resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingLink {
    pub link: Link,
    pub target: Option<PathBuf>,
}

/// Outcome of rewriting links after a rename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRenameReport {
    pub files_updated: usize,
    pub links_updated: usize,
    pub failures: Vec<FileFailure>,
}

/// Byte offsets of one link match within a line
struct LinkMatch {
    whole: Range<usize>,
    target: Range<usize>,
    display: Option<Range<usize>>,
}

/// Match `[[target]]` or `[[target|display]]` starting exactly at `start`
///
/// The target is one or more bytes other than `]` and `|`; the display text
/// is one or more bytes other than `]`.
fn match_link_at(line: &str, start: usize) -> Option<LinkMatch> {
    let bytes = line.as_bytes();
    if !bytes[start..].starts_with(b"[[") {
        return None;
    }

    let target_start = start + 2;
    let mut i = target_start;
    while i < bytes.len() && bytes[i] != b']' && bytes[i] != b'|' {
        i += 1;
    }
    if i == target_start || i == bytes.len() {
        return None;
    }
    let target = target_start..i;

    if bytes[i] == b'|' {
        let display_start = i + 1;
        let mut j = display_start;
        while j < bytes.len() && bytes[j] != b']' {
            j += 1;
        }
        if j > display_start && bytes[j..].starts_with(b"]]") {
            return Some(LinkMatch {
                whole: start..j + 2,
                target,
                display: Some(display_start..j),
            });
        }
        return None;
    }

    bytes[i..].starts_with(b"]]").then(|| LinkMatch {
        whole: start..i + 2,
        target,
        display: None,
    })
}

/// All non-overlapping link matches in one line
///
/// A `[[` immediately preceded by `!` is an embed and never a link.
fn scan_links(line: &str) -> Vec<LinkMatch> {
    let bytes = line.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'[' && (i == 0 || bytes[i - 1] != b'!') {
            if let Some(m) = match_link_at(line, i) {
                i = m.whole.end;
                found.push(m);
                continue;
            }
        }
        i += 1;
    }

    found
}

fn lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
}

/// Extract every wiki link from note content, in document order
pub fn extract_links(content: &str) -> Vec<Link> {
    let mut links = Vec::new();
    for (line_number, line) in lines(content) {
        for m in scan_links(line) {
            links.push(Link {
                link_text: line[m.target.clone()].to_string(),
                display_text: m.display.map(|r| line[r].to_string()),
                range: LinkRange {
                    line: line_number,
                    start_col: m.whole.start,
                    end_col: m.whole.end,
                },
            });
        }
    }
    links
}

/// True if `link_text`, written in `source`, points at `old_target`
///
/// Links that no longer resolve (the file was already moved) are matched by
/// name against `old_target`.
fn link_points_to(
    link_text: &str,
    source: &Path,
    old_target: &Path,
    resolver: &LinkResolver,
) -> bool {
    match resolver.resolve(link_text, Some(source)) {
        Some(resolved) => path_key(&resolved) == path_key(old_target),
        None => {
            let wanted = link_target(link_text).trim_start_matches('/').to_lowercase();
            let stem = old_target
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();
            !wanted.is_empty()
                && (wanted == stem
                    || wanted == path_without_extension(old_target).to_lowercase()
                    || wanted == path_key(old_target))
        }
    }
}

/// `target` (a `/`-joined note path) written relative to `from_dir`
fn relative_link(from_dir: &Path, target: &str) -> String {
    let from: Vec<&str> = from_dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let dirs = &to[..to.len().saturating_sub(1)];
    let common = from.iter().zip(dirs).take_while(|(a, b)| a == b).count();
    let ups = from.len() - common;

    let mut parts: Vec<&str> = std::iter::repeat_n("..", ups).collect();
    parts.extend(&to[common..]);
    let joined = parts.join("/");
    if ups == 0 {
        format!("./{}", joined)
    } else {
        joined
    }
}

/// Replacement link text for a link that pointed at the renamed note
///
/// Keeps the written style where it still resolves to `new_target` from
/// `source` once the rename is done: bare names stay bare, path-qualified
/// links get the new path, relative links stay relative, an explicit
/// extension is kept, and any `#section` or `^block` suffix is carried over.
/// When the styled text would land on another note, the link is anchored:
/// relative links keep a `./` or `../` form, everything else gets `/path`.
fn rewritten_target(
    old_text: &str,
    source: &Path,
    new_target: &Path,
    after: &LinkResolver,
) -> String {
    let base = link_target(old_text);
    let suffix = &old_text[old_text.find(['#', '^']).unwrap_or(old_text.len())..];

    let path = path_without_extension(new_target);
    let from_dir = source.parent().unwrap_or(Path::new(""));
    let relative = base.starts_with("./") || base.starts_with("../");

    let anchored = if relative {
        relative_link(from_dir, &path)
    } else {
        format!("/{}", path)
    };
    let styled = if relative || base.starts_with('/') {
        anchored.clone()
    } else if base.contains('/') {
        path.clone()
    } else {
        new_target
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string()
    };

    let extension = new_target.extension().and_then(|e| e.to_str());
    let with_extension = |text: &str| match extension {
        Some(ext) => format!("{}.{}", text, ext),
        None => text.to_string(),
    };
    let had_extension = Path::new(base)
        .extension()
        .zip(new_target.extension())
        .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b));

    let candidates = if had_extension {
        vec![with_extension(&styled), with_extension(&anchored)]
    } else {
        vec![styled, anchored.clone(), with_extension(&anchored)]
    };

    let wanted = path_key(new_target);
    let text = candidates
        .iter()
        .find(|text| {
            after
                .resolve(text, Some(source))
                .is_some_and(|found| path_key(&found) == wanted)
        })
        .or(candidates.last())
        .cloned()
        .unwrap_or_default();

    format!("{}{}", text, suffix)
}

/// Rewrite links in `content` that point at `old_target`
///
/// Only the target segment of each link changes; display text is kept.
/// `before` resolves links against the current files, `after` against the
/// files once the rename is done. Returns the new content and the number of
/// links rewritten.
fn rewrite_links(
    content: &str,
    source: &Path,
    old_target: &Path,
    new_target: &Path,
    before: &LinkResolver,
    after: &LinkResolver,
) -> (String, usize) {
    let mut output = String::with_capacity(content.len());
    let mut count = 0;

    for (index, raw_line) in content.split('\n').enumerate() {
        if index > 0 {
            output.push('\n');
        }
        let mut last = 0;
        for m in scan_links(raw_line) {
            let text = &raw_line[m.target.clone()];
            // `[[#Heading]]` follows its note wherever it goes
            if link_target(text).is_empty() {
                continue;
            }
            if link_points_to(text, source, old_target, before) {
                output.push_str(&raw_line[last..m.target.start]);
                output.push_str(&rewritten_target(text, source, new_target, after));
                last = m.target.end;
                count += 1;
            }
        }
        output.push_str(&raw_line[last..]);
    }

    (output, count)
}

/// Link extraction plus a backlinks index over the whole corpus
///
/// The index is rebuilt from scratch by [`LinkService::build_backlinks_index`];
/// rename operations read it but never update it.
pub struct LinkService {
    repo: Repository,
    /// Lookup key of the target note -> links pointing at it
    backlinks: HashMap<String, Vec<Backlink>>,
}

impl LinkService {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            backlinks: HashMap::new(),
        }
    }

    pub fn extract_links_from_file(&self, path: &Path) -> Result<Vec<Link>> {
        Ok(extract_links(&self.repo.read_note(path)?))
    }

    /// Scan every note and record each resolvable link under its target
    pub fn build_backlinks_index(&mut self) -> Result<()> {
        self.backlinks.clear();
        let resolver = self.repo.resolver()?;
        let notes = self.repo.note_paths()?;

        for path in &notes {
            let content = match self.repo.read_note(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable note {}: {:#}", path.display(), e);
                    continue;
                }
            };

            for link in extract_links(&content) {
                if let Some(target) = resolver.resolve(&link.link_text, Some(path)) {
                    self.backlinks
                        .entry(path_key(&target))
                        .or_default()
                        .push(Backlink {
                            source_file: path.clone(),
                            link_text: link.link_text,
                            display_text: link.display_text,
                            line: link.range.line,
                        });
                }
            }
        }

        tracing::info!(
            "Built backlinks index: {} notes, {} linked targets",
            notes.len(),
            self.backlinks.len()
        );
        Ok(())
    }

    /// Links recorded against `target` at the last build
    pub fn get_backlinks(&self, target: &Path) -> &[Backlink] {
        self.backlinks
            .get(&path_key(target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_outgoing_links(&self, path: &Path) -> Result<Vec<OutgoingLink>> {
        let resolver = self.repo.resolver()?;
        Ok(self
            .extract_links_from_file(path)?
            .into_iter()
            .map(|link| {
                let target = resolver.resolve(&link.link_text, Some(path));
                OutgoingLink { link, target }
            })
            .collect())
    }

    /// Rewrite links in `source_file` that point at `old_target`
    ///
    /// Returns the number of link occurrences changed; the file is only
    /// written when that is non-zero.
    pub fn update_links_in_file(
        &self,
        source_file: &Path,
        old_target: &Path,
        new_target: &Path,
    ) -> Result<usize> {
        let before = self.repo.resolver()?;
        let after = before.with_renamed(old_target, new_target);
        self.update_with(&before, &after, source_file, old_target, new_target)
    }

    fn update_with(
        &self,
        before: &LinkResolver,
        after: &LinkResolver,
        source_file: &Path,
        old_target: &Path,
        new_target: &Path,
    ) -> Result<usize> {
        let content = self.repo.read_note(source_file)?;
        let (updated, count) =
            rewrite_links(&content, source_file, old_target, new_target, before, after);
        if count > 0 {
            self.repo.storage().write(source_file, &updated)?;
            tracing::debug!(
                "Rewrote {} link(s) in {}",
                count,
                source_file.display()
            );
        }
        Ok(count)
    }

    /// Rewrite every backlink of `old_target` to point at `new_target`
    ///
    /// Sources come from the current index. The target file itself is not
    /// renamed and the index is not rebuilt.
    pub fn update_links_on_rename(&self, old_target: &Path, new_target: &Path) -> LinkRenameReport {
        let mut report = LinkRenameReport::default();

        let sources: BTreeSet<&PathBuf> = self
            .get_backlinks(old_target)
            .iter()
            .map(|b| &b.source_file)
            .collect();
        if sources.is_empty() {
            return report;
        }

        let before = match self.repo.resolver() {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::warn!("Cannot scan notes for link rewrite: {:#}", e);
                report.failures.push(FileFailure::new(old_target, &e));
                return report;
            }
        };

        let after = before.with_renamed(old_target, new_target);

        for source in sources {
            match self.update_with(&before, &after, source, old_target, new_target) {
                Ok(0) => {}
                Ok(count) => {
                    report.files_updated += 1;
                    report.links_updated += count;
                }
                Err(e) => {
                    tracing::warn!("Failed to update links in {}: {:#}", source.display(), e);
                    report.failures.push(FileFailure::new(source.clone(), &e));
                }
            }
        }

        tracing::info!(
            "Updated {} link(s) in {} file(s) for {} -> {}",
            report.links_updated,
            report.files_updated,
            old_target.display(),
            new_target.display()
        );
        report
    }
}
