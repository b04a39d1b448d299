//! Embeds (`![[...]]`): extraction, section content, images, transclusion cache

use crate::link::LinkRange;
use crate::repository::{Repository, path_key};
use anyhow::Result;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// File extensions rendered as images
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp"];

/// True if `name` has an image extension (case-insensitive)
pub fn is_image_file(name: &str) -> bool {
    Path::new(name.trim())
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedType {
    Note,
    Image,
}

impl EmbedType {
    pub fn of(note_name: &str) -> Self {
        if is_image_file(note_name) {
            EmbedType::Image
        } else {
            EmbedType::Note
        }
    }
}

/// An `![[name]]`, `![[name#Section]]` or `![[name|Display]]` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub note_name: String,
    pub section: Option<String>,
    pub display_text: Option<String>,
    pub range: LinkRange,
}

impl Embed {
    pub fn embed_type(&self) -> EmbedType {
        EmbedType::of(&self.note_name)
    }
}

/// Advance over one or more bytes not in `stop`; `None` if none were consumed
fn take_until(bytes: &[u8], start: usize, stop: &[u8]) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() && !stop.contains(&bytes[i]) {
        i += 1;
    }
    (i > start).then_some(i)
}

/// Match an embed starting at the `!` at `start`; returns the embed and its end
fn match_embed_at(line: &str, line_number: usize, start: usize) -> Option<(Embed, usize)> {
    let bytes = line.as_bytes();
    if !bytes[start..].starts_with(b"![[") {
        return None;
    }

    let name_start = start + 3;
    let mut i = take_until(bytes, name_start, b"]|#")?;
    let note_name = &line[name_start..i];

    let mut section = None;
    if bytes.get(i) == Some(&b'#') {
        let end = take_until(bytes, i + 1, b"]|")?;
        section = Some(&line[i + 1..end]);
        i = end;
    }

    let mut display_text = None;
    if bytes.get(i) == Some(&b'|') {
        let end = take_until(bytes, i + 1, b"]")?;
        display_text = Some(&line[i + 1..end]);
        i = end;
    }

    if !bytes[i..].starts_with(b"]]") {
        return None;
    }
    let end = i + 2;

    Some((
        Embed {
            note_name: note_name.to_string(),
            section: section.map(str::to_string),
            display_text: display_text.map(str::to_string),
            range: LinkRange {
                line: line_number,
                start_col: start,
                end_col: end,
            },
        },
        end,
    ))
}

/// Extract every embed from note content, in document order
pub fn extract_embeds(content: &str) -> Vec<Embed> {
    let mut embeds = Vec::new();

    for (line_number, line) in content.split('\n').enumerate() {
        let mut i = 0;
        while i < line.len() {
            if line.as_bytes()[i] == b'!'
                && let Some((embed, end)) = match_embed_at(line, line_number, i)
            {
                embeds.push(embed);
                i = end;
                continue;
            }
            i += 1;
        }
    }

    embeds
}

/// A markdown heading with the byte offset of the line it starts on
struct Heading {
    level: HeadingLevel,
    text: String,
    line_start: usize,
}

fn headings(content: &str) -> Vec<Heading> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let mut found = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                let line_start = content[..range.start].rfind('\n').map_or(0, |i| i + 1);
                current = Some(Heading {
                    level,
                    text: String::new(),
                    line_start,
                });
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.text = heading.text.trim().to_string();
                    found.push(heading);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    found
}

/// Content of one section: its heading line through the line before the next
/// heading of the same or a higher level
pub fn section_content(content: &str, section: &str) -> Option<String> {
    let wanted = section.trim().to_lowercase();
    let all = headings(content);
    let index = all.iter().position(|h| h.text.to_lowercase() == wanted)?;

    let heading = &all[index];
    let end = all[index + 1..]
        .iter()
        .find(|h| (h.level as u8) <= (heading.level as u8))
        .map_or(content.len(), |h| h.line_start);

    Some(content[heading.line_start..end].to_string())
}

/// Size and modification time of an embedded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub size: u64,
    pub modified: SystemTime,
}

struct CacheEntry {
    document: PathBuf,
    sources: BTreeSet<PathBuf>,
    stored_at: Instant,
}

/// Embed lookups plus a two-way cache of which documents embed which files
///
/// Cache entries older than the configured TTL read as absent; they are
/// dropped only when replaced or cleared.
pub struct EmbedService {
    repo: Repository,
    ttl: Duration,
    /// Document key -> resolved embedded sources
    embedded: HashMap<String, CacheEntry>,
    /// Source key -> keys of documents embedding it
    embedding: HashMap<String, BTreeSet<String>>,
}

impl EmbedService {
    pub fn new(repo: Repository) -> Self {
        let ttl = repo.config().cache.ttl();
        Self::with_ttl(repo, ttl)
    }

    pub fn with_ttl(repo: Repository, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            embedded: HashMap::new(),
            embedding: HashMap::new(),
        }
    }

    pub fn extract_embeds_from_file(&self, path: &Path) -> Result<Vec<Embed>> {
        Ok(extract_embeds(&self.repo.read_note(path)?))
    }

    /// Whole note, or one section of it; `None` if either is missing
    pub fn get_embed_content(&self, path: &Path, section: Option<&str>) -> Option<String> {
        let content = self.repo.read_note(path).ok()?;
        match section {
            None => Some(content),
            Some(section) => section_content(&content, section),
        }
    }

    /// Heading texts of a note in document order; empty if unreadable
    pub fn get_sections_from_note(&self, path: &Path) -> Vec<String> {
        match self.repo.read_note(path) {
            Ok(content) => headings(&content).into_iter().map(|h| h.text).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Resolve an embed target to an existing file
    ///
    /// `/`-prefixed references are relative to the notes root, `./` and `../`
    /// references to `from_document`'s directory, and bare references try
    /// that directory first and then the root.
    pub fn resolve_embed_target(&self, reference: &str, from_document: Option<&Path>) -> Option<PathBuf> {
        self.repo
            .resolve_link(reference, from_document)
            .unwrap_or_else(|e| {
                tracing::warn!("Cannot resolve embed {}: {:#}", reference, e);
                None
            })
    }

    /// Resolve an image reference to an existing file
    ///
    /// An absolute filesystem path is checked as is. Anything else, including
    /// an absolute path that does not exist, goes through
    /// [`EmbedService::resolve_embed_target`].
    pub fn resolve_image_path(&self, reference: &str, from_document: Option<&Path>) -> Option<PathBuf> {
        let direct = Path::new(reference.trim());
        if direct.is_absolute() && self.repo.storage().exists(direct) {
            return Some(direct.to_path_buf());
        }
        self.resolve_embed_target(reference, from_document)
    }

    pub fn get_image_metadata(&self, path: &Path) -> Option<ImageMetadata> {
        self.repo
            .storage()
            .metadata(path)
            .ok()
            .map(|stats| ImageMetadata {
                size: stats.size,
                modified: stats.modified,
            })
    }

    /// Replace the cached set of files `document` embeds
    ///
    /// Embeds that do not resolve to an existing file are skipped.
    pub fn update_embed_sources_cache(&mut self, document: &Path, embeds: &[Embed]) -> Result<()> {
        let resolver = self.repo.resolver()?;
        let sources: BTreeSet<PathBuf> = embeds
            .iter()
            .filter_map(|embed| resolver.resolve(&embed.note_name, Some(document)))
            .collect();

        self.clear_embed_sources_cache(document);

        let document_key = path_key(document);
        for source in &sources {
            self.embedding
                .entry(path_key(source))
                .or_default()
                .insert(document_key.clone());
        }
        tracing::debug!(
            "Cached {} embedded source(s) for {}",
            sources.len(),
            document.display()
        );
        self.embedded.insert(
            document_key,
            CacheEntry {
                document: document.to_path_buf(),
                sources,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Read `document`, extract its embeds and cache their sources
    pub fn refresh_document(&mut self, document: &Path) -> Result<()> {
        let embeds = self.extract_embeds_from_file(document)?;
        self.update_embed_sources_cache(document, &embeds)
    }

    fn fresh_entry(&self, document_key: &str) -> Option<&CacheEntry> {
        let entry = self.embedded.get(document_key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry)
        } else {
            tracing::debug!("Embed cache entry for {} is stale", entry.document.display());
            None
        }
    }

    pub fn get_embedded_sources(&self, document: &Path) -> Vec<PathBuf> {
        self.fresh_entry(&path_key(document))
            .map(|entry| entry.sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_documents_embedding_source(&self, source: &Path) -> Vec<PathBuf> {
        let Some(documents) = self.embedding.get(&path_key(source)) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = documents
            .iter()
            .filter_map(|key| self.fresh_entry(key))
            .map(|entry| entry.document.clone())
            .collect();
        found.sort();
        found
    }

    pub fn clear_embed_sources_cache(&mut self, document: &Path) {
        let document_key = path_key(document);
        let Some(previous) = self.embedded.remove(&document_key) else {
            return;
        };
        for source in previous.sources {
            let source_key = path_key(&source);
            if let Some(documents) = self.embedding.get_mut(&source_key) {
                documents.remove(&document_key);
                if documents.is_empty() {
                    self.embedding.remove(&source_key);
                }
            }
        }
    }

    pub fn clear_all_embed_sources_cache(&mut self) {
        self.embedded.clear();
        self.embedding.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn service(files: &[(&str, &str)], ttl: Duration) -> (EmbedService, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        for (path, content) in files {
            storage.write(Path::new(path), content).unwrap();
        }
        let repo = Repository::new(storage.clone(), Arc::new(LibraryConfig::default()));
        (EmbedService::with_ttl(repo, ttl), storage)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_extract_embed_variants() {
        let embeds = extract_embeds(
            "![[Note]] ![[Note#Part Two]] ![[Note|Shown]]\n![[Note#Sec|Shown]] ![[pic.PNG]]",
        );
        assert_eq!(embeds.len(), 5);
        assert_eq!(embeds[0].note_name, "Note");
        assert_eq!(embeds[0].section, None);
        assert_eq!(embeds[1].section.as_deref(), Some("Part Two"));
        assert_eq!(embeds[2].display_text.as_deref(), Some("Shown"));
        assert_eq!(embeds[3].section.as_deref(), Some("Sec"));
        assert_eq!(embeds[3].display_text.as_deref(), Some("Shown"));
        assert_eq!(embeds[3].range, LinkRange { line: 1, start_col: 0, end_col: 19 });
        assert_eq!(embeds[4].embed_type(), EmbedType::Image);
        assert_eq!(embeds[0].embed_type(), EmbedType::Note);
    }

    #[test]
    fn test_extract_embeds_ignores_plain_links() {
        assert!(extract_embeds("[[Note]] and [[Other|x]] ![[]] ![[a#]]").is_empty());
    }

    #[test]
    fn test_is_image_file() {
        for name in ["a.png", "b.JPG", "c.jpeg", "d.gif", "e.svg", "f.webp", "g.bmp"] {
            assert!(is_image_file(name), "{name}");
        }
        assert!(!is_image_file("note.md"));
        assert!(!is_image_file("png"));
    }

    #[test]
    fn test_section_extraction_stops_at_sibling() {
        let content = "# Doc\n\n## One\nContent one\n### Nested\nNested body\n## Two\nContent two\n";
        let (embeds, _) = service(&[("doc.md", content)], HOUR);

        let one = embeds
            .get_embed_content(Path::new("doc.md"), Some("One"))
            .unwrap();
        assert!(one.contains("## One"));
        assert!(one.contains("Content one"));
        assert!(one.contains("Nested body"));
        assert!(!one.contains("Two"));
        assert!(!one.contains("Content two"));

        let two = embeds
            .get_embed_content(Path::new("doc.md"), Some(" two "))
            .unwrap();
        assert_eq!(two, "## Two\nContent two\n");
    }

    #[test]
    fn test_embed_content_not_found() {
        let (embeds, _) = service(&[("doc.md", "# Only")], HOUR);
        assert_eq!(
            embeds.get_embed_content(Path::new("doc.md"), None).as_deref(),
            Some("# Only")
        );
        assert!(embeds.get_embed_content(Path::new("doc.md"), Some("Missing")).is_none());
        assert!(embeds.get_embed_content(Path::new("nope.md"), None).is_none());
    }

    #[test]
    fn test_sections_from_note_skip_frontmatter() {
        let content = "---\ntitle: x\n---\n# First\ntext\n## Second\n#### Deep `code`\n";
        let (embeds, _) = service(&[("doc.md", content)], HOUR);
        assert_eq!(
            embeds.get_sections_from_note(Path::new("doc.md")),
            vec!["First", "Second", "Deep code"]
        );
        assert!(embeds.get_sections_from_note(Path::new("nope.md")).is_empty());
    }

    #[test]
    fn test_resolve_image_path() {
        let (embeds, _) = service(
            &[
                ("notes/pic.png", ""),
                ("assets/logo.svg", ""),
                ("notes/doc.md", ""),
            ],
            HOUR,
        );
        let doc = Path::new("notes/doc.md");
        assert_eq!(
            embeds.resolve_image_path("./pic.png", Some(doc)),
            Some(PathBuf::from("notes/pic.png"))
        );
        assert_eq!(
            embeds.resolve_image_path("pic.png", Some(doc)),
            Some(PathBuf::from("notes/pic.png"))
        );
        assert_eq!(
            embeds.resolve_image_path("/assets/logo.svg", Some(doc)),
            Some(PathBuf::from("assets/logo.svg"))
        );
        assert_eq!(embeds.resolve_image_path("./logo.svg", Some(doc)), None);
        assert!(embeds.get_image_metadata(Path::new("notes/pic.png")).is_some());
        assert!(embeds.get_image_metadata(Path::new("missing.png")).is_none());
    }

    #[test]
    fn test_transclusion_cache_replaces_and_tracks_reverse() {
        let (mut embeds, _) = service(
            &[
                ("a.md", "![[b]] ![[c#Part]] ![[missing]]"),
                ("b.md", ""),
                ("c.md", ""),
                ("d.md", "![[b]]"),
            ],
            HOUR,
        );

        embeds.refresh_document(Path::new("a.md")).unwrap();
        embeds.refresh_document(Path::new("d.md")).unwrap();
        assert_eq!(
            embeds.get_embedded_sources(Path::new("a.md")),
            vec![PathBuf::from("b.md"), PathBuf::from("c.md")]
        );
        assert_eq!(
            embeds.get_documents_embedding_source(Path::new("b.md")),
            vec![PathBuf::from("a.md"), PathBuf::from("d.md")]
        );

        // Replacing, not merging
        let only_c = extract_embeds("![[c]]");
        embeds
            .update_embed_sources_cache(Path::new("a.md"), &only_c)
            .unwrap();
        assert_eq!(
            embeds.get_embedded_sources(Path::new("a.md")),
            vec![PathBuf::from("c.md")]
        );
        assert_eq!(
            embeds.get_documents_embedding_source(Path::new("b.md")),
            vec![PathBuf::from("d.md")]
        );

        embeds.clear_embed_sources_cache(Path::new("d.md"));
        assert!(embeds.get_documents_embedding_source(Path::new("b.md")).is_empty());

        embeds.clear_all_embed_sources_cache();
        assert!(embeds.get_embedded_sources(Path::new("a.md")).is_empty());
    }

    #[test]
    fn test_stale_cache_entries_read_as_absent() {
        let (mut embeds, _) = service(&[("a.md", "![[b]]"), ("b.md", "")], Duration::ZERO);
        embeds.refresh_document(Path::new("a.md")).unwrap();
        assert!(embeds.get_embedded_sources(Path::new("a.md")).is_empty());
        assert!(embeds.get_documents_embedding_source(Path::new("b.md")).is_empty());
    }
}
