//! NoteWeave - a wiki-link and tag engine for Markdown note collections
//!
//! This library provides the core logic for working with a directory of
//! Markdown notes: `[[wiki links]]` and backlinks, `![[embeds]]`, placeholder
//! links, `#tags` with bulk rename and merge, structured search, templates and
//! bundles. It separates that logic from CLI concerns like argument parsing
//! and terminal output.
//!
//! # Example
//!
//! ```no_run
//! use noteweave::{NoteWeave, RealStorage};
//! use std::path::PathBuf;
//!
//! let storage = Box::new(RealStorage::new(PathBuf::from("/home/me/notes")));
//! let mut notes = NoteWeave::with_defaults(storage);
//!
//! for result in notes.search("rust tag:project").unwrap() {
//!     println!("{} ({:.2})", result.title, result.score);
//! }
//!
//! let report = notes.rename_tag("bug", "defect").unwrap();
//! println!("updated {} notes", report.notes_updated_count());
//! ```

pub mod bundle;
pub mod config;
pub mod embed;
pub mod error;
pub mod frontmatter;
pub mod health;
pub mod link;
pub mod placeholder;
pub mod repository;
pub mod search;
pub mod storage;
pub mod tag_edit;
pub mod tag_index;
pub mod tags;
pub mod template;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type alias using anyhow::Error
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Main library API for NoteWeave
///
/// Owns the configuration, the repository and every stateful service.
/// Indexes are built on first use and rebuilt from scratch after any
/// operation that changes the notes they describe.
pub struct NoteWeave {
    repo: repository::Repository,
    links: link::LinkService,
    embeds: embed::EmbedService,
    placeholders: placeholder::PlaceholdersService,
    tags: tag_index::TagService,
    tag_editor: tag_edit::TagEditor,
    search: search::AdvancedSearch,
    templates: template::TemplateGenerator,
    bundles: bundle::BundleService,
}

impl NoteWeave {
    /// Create a new NoteWeave instance with the given configuration and storage
    pub fn new(config: config::LibraryConfig, storage: Box<dyn storage::Storage>) -> Self {
        let options = search::SearchOptions::from(config.search.clone());
        let repo = repository::Repository::new(Arc::from(storage), Arc::new(config));

        Self {
            links: link::LinkService::new(repo.clone()),
            embeds: embed::EmbedService::new(repo.clone()),
            placeholders: placeholder::PlaceholdersService::new(repo.clone()),
            tags: tag_index::TagService::new(repo.clone()),
            tag_editor: tag_edit::TagEditor::new(repo.clone()),
            search: search::AdvancedSearch::new(
                Box::new(search::StorageScanner::new(repo.clone())),
                options,
            ),
            templates: template::TemplateGenerator::new(repo.clone()),
            bundles: bundle::BundleService::new(repo.clone()),
            repo,
        }
    }

    /// Create NoteWeave by loading configuration from storage
    pub fn from_storage(storage: Box<dyn storage::Storage>) -> Result<Self> {
        let config = config::LibraryConfig::load(&*storage)?;
        Ok(Self::new(config, storage))
    }

    /// Create NoteWeave with the stored configuration, or defaults if none
    pub fn with_defaults(storage: Box<dyn storage::Storage>) -> Self {
        let config = config::LibraryConfig::load_or_default(&*storage);
        Self::new(config, storage)
    }

    pub fn config(&self) -> &config::LibraryConfig {
        self.repo.config()
    }

    pub fn repository(&self) -> &repository::Repository {
        &self.repo
    }

    /// Relative paths of every note, sorted
    pub fn note_paths(&self) -> Result<Vec<PathBuf>> {
        self.repo.note_paths()
    }

    /// Find a note by relative path, or by link text as written in `[[...]]`
    pub fn find_note(&self, name: &str) -> Result<Option<PathBuf>> {
        let path = Path::new(name);
        if self.repo.storage().exists(path) && self.repo.is_note(path) {
            return Ok(Some(path.to_path_buf()));
        }
        self.repo.resolve_link(name, None)
    }

    fn refresh_indexes(&mut self) -> Result<()> {
        self.links.build_backlinks_index()?;
        self.tags.build_tag_index()?;
        self.embeds.clear_all_embed_sources_cache();
        Ok(())
    }

    // Links

    /// Links leaving `note`, resolved where possible
    pub fn outgoing_links(&self, note: &Path) -> Result<Vec<link::OutgoingLink>> {
        self.links.get_outgoing_links(note)
    }

    /// Links pointing at `note`, from a fresh backlinks index
    pub fn backlinks(&mut self, note: &Path) -> Result<Vec<link::Backlink>> {
        self.links.build_backlinks_index()?;
        Ok(self.links.get_backlinks(note).to_vec())
    }

    /// Rename a note and rewrite every link pointing at it
    ///
    /// Links are rewritten first, then the file is moved, then all indexes
    /// are rebuilt. Per-file link rewrite failures are in the report.
    pub fn rename_note(&mut self, old: &Path, new: &Path) -> Result<link::LinkRenameReport> {
        if !self.repo.storage().exists(old) {
            anyhow::bail!("Note not found: {}", old.display());
        }
        if self.repo.storage().exists(new) {
            return Err(error::Error::NoteExists(new.to_path_buf()).into());
        }

        self.links.build_backlinks_index()?;
        let report = self.links.update_links_on_rename(old, new);
        self.repo.storage().rename(old, new)?;
        tracing::info!("Renamed {} to {}", old.display(), new.display());

        self.refresh_indexes()?;
        Ok(report)
    }

    // Placeholders

    pub fn placeholders(&self) -> &placeholder::PlaceholdersService {
        &self.placeholders
    }

    /// Create the note a placeholder link names
    ///
    /// The default note extension is added unless the link text already ends
    /// in a note extension. The note is titled with the last path segment.
    pub fn create_note_from_placeholder(&mut self, link_text: &str) -> Result<PathBuf> {
        if let Some(existing) = self.repo.resolve_link(link_text, None)? {
            return Err(error::Error::NoteExists(existing).into());
        }

        let target = repository::link_target(link_text).replace('\\', "/");
        let Some(path) = repository::normalize_path(Path::new(target.trim_start_matches('/')))
            .filter(|p| p.file_name().is_some())
        else {
            anyhow::bail!("Cannot create a note for link '{}'", link_text);
        };

        let path = if self.repo.is_note(&path) {
            path
        } else {
            PathBuf::from(format!(
                "{}.{}",
                path.display(),
                self.repo.config().default_extension()
            ))
        };

        let title = Path::new(&target)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(target.as_str())
            .to_string();
        self.templates
            .create_note_at(&path, &title, None, &BTreeMap::new())?;

        self.refresh_indexes()?;
        Ok(path)
    }

    // Embeds

    pub fn embeds(&self) -> &embed::EmbedService {
        &self.embeds
    }

    pub fn embeds_mut(&mut self) -> &mut embed::EmbedService {
        &mut self.embeds
    }

    // Tags

    fn ensure_tag_index(&mut self) -> Result<()> {
        if !self.tags.is_built() {
            self.tags.build_tag_index()?;
        }
        Ok(())
    }

    /// Every tag with its note count
    pub fn list_tags(&mut self, sort: tag_index::TagSort) -> Result<Vec<tag_index::TagCount>> {
        self.ensure_tag_index()?;
        Ok(self.tags.get_all_tags(sort))
    }

    /// Notes carrying all of `tags`
    pub fn notes_with_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<Vec<PathBuf>> {
        self.ensure_tag_index()?;
        Ok(self.tags.get_notes_with_tags(tags))
    }

    pub fn tags_for_note(&mut self, note: &Path) -> Result<Vec<String>> {
        self.ensure_tag_index()?;
        Ok(self.tags.get_tags_for_note(note))
    }

    /// What renaming `old` to `new` would change, without changing it
    pub fn plan_tag_rename(&mut self, old: &str, new: &str) -> Result<tag_edit::RenamePlan> {
        self.ensure_tag_index()?;
        self.tag_editor.plan_rename(&self.tags, old, new)
    }

    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<tag_edit::TagEditReport> {
        self.ensure_tag_index()?;
        let report = self.tag_editor.rename_tag(&self.tags, old, new)?;
        self.tags.build_tag_index()?;
        Ok(report)
    }

    pub fn merge_tags(&mut self, into: &str, from: &str) -> Result<tag_edit::TagEditReport> {
        self.ensure_tag_index()?;
        let report = self.tag_editor.merge_tags(&self.tags, into, from)?;
        self.tags.build_tag_index()?;
        Ok(report)
    }

    pub fn delete_tag(&mut self, tag: &str) -> Result<tag_edit::TagEditReport> {
        self.ensure_tag_index()?;
        let report = self.tag_editor.delete_tag(&self.tags, tag)?;
        self.tags.build_tag_index()?;
        Ok(report)
    }

    // Search

    /// Parse and run a search query string
    pub fn search(&self, query: &str) -> Result<Vec<search::SearchResult>> {
        self.search.search_str(query)
    }

    pub fn search_query(&self, query: &search::SearchQuery) -> Result<Vec<search::SearchResult>> {
        self.search.search(query)
    }

    // Templates and bundles

    /// Create a new note with the given title and optional template
    ///
    /// Returns the relative path to the created note
    pub fn create_note(&mut self, title: &str, template_name: Option<&str>) -> Result<PathBuf> {
        self.create_note_with_vars(title, template_name, &BTreeMap::new())
    }

    pub fn create_note_with_vars(
        &mut self,
        title: &str,
        template_name: Option<&str>,
        vars: &BTreeMap<String, String>,
    ) -> Result<PathBuf> {
        let path = self.templates.create_note(title, template_name, vars)?;
        self.refresh_indexes()?;
        Ok(path)
    }

    pub fn list_templates(&self) -> Result<Vec<String>> {
        self.templates.list_templates()
    }

    pub fn list_bundles(&self) -> Result<Vec<String>> {
        self.bundles.list_bundles()
    }

    /// Generate the notes of the named bundle
    pub fn run_bundle(
        &mut self,
        name: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<bundle::BundleReport> {
        let bundle = self.bundles.load_bundle(name)?;
        let report = self.bundles.generate(&bundle, vars, &self.templates)?;
        if !report.created.is_empty() {
            self.refresh_indexes()?;
        }
        Ok(report)
    }

    // Health

    /// Run health checks on the note collection
    ///
    /// Returns a report of placeholder links, untagged and orphaned notes,
    /// and invalid frontmatter tags
    pub fn check_health(&mut self) -> Result<health::HealthReport> {
        self.links.build_backlinks_index()?;
        health::check_health(&self.repo, &self.links)
    }
}

// Re-export main types for convenience
pub use bundle::{Bundle, BundleReport};
pub use config::LibraryConfig;
pub use embed::{Embed, EmbedService, EmbedType};
pub use error::{Error, FileFailure};
pub use health::HealthReport;
pub use link::{Backlink, Link, LinkRenameReport, OutgoingLink};
pub use placeholder::{Placeholder, PlaceholderOccurrence, PlaceholderSource};
pub use repository::Repository;
pub use search::{SearchOptions, SearchQuery, SearchResult};
pub use storage::{MemoryStorage, RealStorage, Storage};
pub use tag_edit::{RenamePlan, TagEditReport};
pub use tag_index::{TagCount, TagSort};
