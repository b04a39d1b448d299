//! Corpus-wide tag index

use crate::repository::Repository;
use crate::tags::{extract_tags_from_content, normalize_tag};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Ordering for [`TagService::get_all_tags`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagSort {
    /// Most used first, ties alphabetical
    #[default]
    Frequency,
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

/// Tag -> notes and note -> tags, rebuilt from a full scan
#[derive(Default)]
pub struct TagIndex {
    notes_by_tag: BTreeMap<String, BTreeSet<PathBuf>>,
    tags_by_note: BTreeMap<PathBuf, Vec<String>>,
}

impl TagIndex {
    fn insert(&mut self, note: PathBuf, tags: Vec<String>) {
        for tag in &tags {
            self.notes_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(note.clone());
        }
        self.tags_by_note.insert(note, tags);
    }
}

pub struct TagService {
    repo: Repository,
    index: TagIndex,
    built: bool,
}

impl TagService {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            index: TagIndex::default(),
            built: false,
        }
    }

    /// Replace the index with a fresh scan of every note
    pub fn build_tag_index(&mut self) -> Result<()> {
        let mut index = TagIndex::default();
        let notes = self.repo.note_paths()?;

        for path in notes {
            match self.repo.read_note(&path) {
                Ok(content) => index.insert(path, extract_tags_from_content(&content)),
                Err(e) => tracing::warn!("Skipping unreadable note {}: {:#}", path.display(), e),
            }
        }

        tracing::info!(
            "Built tag index: {} tags across {} notes",
            index.notes_by_tag.len(),
            index.tags_by_note.len()
        );
        self.index = index;
        self.built = true;
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Every tag with the number of notes carrying it
    pub fn get_all_tags(&self, sort: TagSort) -> Vec<TagCount> {
        let mut tags: Vec<TagCount> = self
            .index
            .notes_by_tag
            .iter()
            .map(|(name, notes)| TagCount {
                name: name.clone(),
                count: notes.len(),
            })
            .collect();

        // Map order is already alphabetical; the sort is stable
        if sort == TagSort::Frequency {
            tags.sort_by(|a, b| b.count.cmp(&a.count));
        }
        tags
    }

    pub fn get_tags_for_note(&self, path: &Path) -> Vec<String> {
        self.index
            .tags_by_note
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_notes_with_tag(&self, tag: &str) -> Vec<PathBuf> {
        self.index
            .notes_by_tag
            .get(&normalize_tag(tag))
            .map(|notes| notes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Notes carrying every one of `tags`; empty input matches nothing
    pub fn get_notes_with_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<PathBuf> {
        let mut sets = Vec::with_capacity(tags.len());
        for tag in tags {
            match self.index.notes_by_tag.get(&normalize_tag(tag.as_ref())) {
                Some(notes) => sets.push(notes),
                None => return Vec::new(),
            }
        }

        let Some((first, rest)) = sets.split_first() else {
            return Vec::new();
        };
        first
            .iter()
            .filter(|note| rest.iter().all(|set| set.contains(*note)))
            .cloned()
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.index.notes_by_tag.contains_key(&normalize_tag(tag))
    }

    /// Number of distinct tags
    pub fn get_tag_count(&self) -> usize {
        self.index.notes_by_tag.len()
    }

    /// Notes seen by the last build, with or without tags
    pub fn indexed_notes(&self) -> impl Iterator<Item = (&PathBuf, &Vec<String>)> {
        self.index.tags_by_note.iter()
    }

    pub fn clear_cache(&mut self) {
        self.index = TagIndex::default();
        self.built = false;
    }
}
