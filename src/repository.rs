//! Corpus access: note discovery, reading, and link-target resolution

use crate::config::LibraryConfig;
use crate::frontmatter;
use crate::storage::Storage;
use anyhow::Result;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use wildmatch::WildMatch;

/// Shared handle on the notes directory
///
/// Cheap to clone; every service keeps its own handle.
#[derive(Clone)]
pub struct Repository {
    storage: Arc<dyn Storage>,
    config: Arc<LibraryConfig>,
}

impl Repository {
    pub fn new(storage: Arc<dyn Storage>, config: Arc<LibraryConfig>) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &dyn Storage {
        &*self.storage
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let key = path_key(path);
        self.config
            .ignore
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(&key))
    }

    /// True if `path` has one of the configured note extensions
    pub fn is_note(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.config
                    .note_extensions
                    .iter()
                    .any(|n| n.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Every non-hidden, non-ignored file in the corpus
    pub fn all_files(&self) -> Result<Vec<PathBuf>> {
        let files = self.storage.walk_files(Path::new(""))?;
        Ok(files.into_iter().filter(|p| !self.is_ignored(p)).collect())
    }

    /// Discover all notes in the repository, sorted by path
    pub fn note_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|p| self.is_note(p))
            .collect())
    }

    pub fn read_note(&self, path: &Path) -> Result<String> {
        self.storage.read_to_string(path)
    }

    /// Snapshot of the corpus used to resolve link text to note paths
    pub fn resolver(&self) -> Result<LinkResolver> {
        Ok(LinkResolver::new(
            self.all_files()?,
            self.config.note_extensions.clone(),
        ))
    }

    /// Resolve a single link; builds a fresh resolver
    pub fn resolve_link(&self, link_text: &str, from: Option<&Path>) -> Result<Option<PathBuf>> {
        Ok(self.resolver()?.resolve(link_text, from))
    }
}

/// `/`-joined, lowercased form of a relative path used for lookups
pub fn path_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase()
}

/// Lexically resolve `.` and `..`; `None` when the path escapes the root
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(s) => out.push(s),
        }
    }
    Some(out)
}

/// Link text with any `#section` or `^block` suffix removed
pub fn link_target(link_text: &str) -> &str {
    let end = link_text.find(['#', '^']).unwrap_or(link_text.len());
    link_text[..end].trim()
}

/// Path of `path` without its extension, `/`-joined
pub fn path_without_extension(path: &Path) -> String {
    let stem = path.with_extension("");
    stem.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves link text to existing files
///
/// Resolution order for a link written in `from`:
/// 1. `./` and `../` links resolve against `from`'s directory only;
/// 2. other links try `from`'s directory, then the notes root
///    (a leading `/` means the root only);
/// 3. each candidate is tried as written, then with each note extension;
/// 4. otherwise the note whose extension-less path ends with the link text,
///    preferring the fewest path segments, then the lowest path.
pub struct LinkResolver {
    files: HashMap<String, PathBuf>,
    /// Notes in preference order with their lowercase extension-less keys
    notes: Vec<(String, PathBuf)>,
    extensions: Vec<String>,
}

impl LinkResolver {
    pub fn new(files: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let is_note = |p: &Path| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|n| n.eq_ignore_ascii_case(ext)))
        };

        let mut notes: Vec<(String, PathBuf)> = files
            .iter()
            .filter(|p| is_note(p))
            .map(|p| (path_without_extension(p).to_lowercase(), p.clone()))
            .collect();
        notes.sort_by(|(_, a), (_, b)| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });

        let files = files.into_iter().map(|p| (path_key(&p), p)).collect();

        Self {
            files,
            notes,
            extensions,
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&path_key(path))
    }

    /// The same file set with `old` moved to `new`
    pub fn with_renamed(&self, old: &Path, new: &Path) -> LinkResolver {
        let (old_key, new_key) = (path_key(old), path_key(new));
        let mut files: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(key, _)| **key != old_key && **key != new_key)
            .map(|(_, path)| path.clone())
            .collect();
        files.push(new.to_path_buf());
        LinkResolver::new(files, self.extensions.clone())
    }

    fn lookup(&self, base: &Path) -> Option<PathBuf> {
        let key = path_key(base);
        if key.is_empty() {
            return None;
        }
        if let Some(found) = self.files.get(&key) {
            return Some(found.clone());
        }
        self.extensions
            .iter()
            .find_map(|ext| self.files.get(&format!("{}.{}", key, ext.to_lowercase())))
            .cloned()
    }

    fn strip_note_extension<'a>(&self, target: &'a str) -> &'a str {
        for ext in &self.extensions {
            let suffix_len = ext.len() + 1;
            if target.len() > suffix_len {
                let (head, tail) = target.split_at(target.len() - suffix_len);
                if tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(ext) {
                    return head;
                }
            }
        }
        target
    }

    /// Path of the file `link_text` points to, if it exists
    pub fn resolve(&self, link_text: &str, from: Option<&Path>) -> Option<PathBuf> {
        let target = link_target(link_text).replace('\\', "/");
        if target.is_empty() {
            // `[[#Heading]]` points into the linking note itself
            return from.filter(|_| link_text.trim_start().starts_with('#')).map(Path::to_path_buf);
        }

        let from_dir = from.and_then(Path::parent).unwrap_or(Path::new(""));

        let mut bases: Vec<PathBuf> = Vec::new();
        if target.starts_with("./") || target.starts_with("../") {
            return normalize_path(&from_dir.join(&target)).and_then(|base| self.lookup(&base));
        } else if let Some(rooted) = target.strip_prefix('/') {
            bases.extend(normalize_path(Path::new(rooted)));
        } else {
            if from.is_some() {
                bases.extend(normalize_path(&from_dir.join(&target)));
            }
            bases.extend(normalize_path(Path::new(&target)));
        }

        if let Some(found) = bases.iter().find_map(|base| self.lookup(base)) {
            return Some(found);
        }

        // Fallback by name, matching whole trailing path segments
        let wanted = self
            .strip_note_extension(target.trim_start_matches('/'))
            .to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        let suffix = format!("/{}", wanted);
        self.notes
            .iter()
            .find(|(key, _)| *key == wanted || key.ends_with(&suffix))
            .map(|(_, path)| path.clone())
    }
}

/// Title of a note: frontmatter `title`, then the first H1, then the file stem
pub fn note_title(path: &Path, content: &str) -> String {
    frontmatter::field(content, "title")
        .or_else(|| extract_first_h1(&content[frontmatter::body_start(content)..]))
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Untitled")
                .to_string()
        })
}

/// Extract the first H1 heading from markdown
fn extract_first_h1(content: &str) -> Option<String> {
    let parser = Parser::new(content);
    let mut in_h1 = false;
    let mut h1_text = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => {
                in_h1 = true;
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if !h1_text.is_empty() {
                    return Some(h1_text);
                }
                in_h1 = false;
            }
            Event::Text(text) | Event::Code(text) if in_h1 => {
                h1_text.push_str(&text);
            }
            _ => {}
        }
    }

    None
}
