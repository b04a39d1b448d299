//! Note templates and the generator cache

use crate::error::Error;
use crate::repository::Repository;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const TEMPLATE_EXTENSION: &str = "md";

/// Substitute `{{title}}`, `{{date}}`, `{{datetime}}` and caller variables
///
/// Unknown placeholders are left as written.
pub fn render_template(
    template: &str,
    title: &str,
    vars: &BTreeMap<String, String>,
    now: DateTime<Local>,
) -> String {
    let date = now.format("%Y-%m-%d").to_string();
    let datetime = now.to_rfc3339();

    let mut rendered = template
        .replace("{{title}}", title)
        .replace("{{date}}", &date)
        .replace("{{datetime}}", &datetime);

    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{{{}}}}}", name), value);
    }

    rendered
}

/// File-name form of a title: lowercase, alphanumeric runs joined by `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

struct CachedRender {
    content: String,
    stored_at: Instant,
}

/// Renders templates from the configured template directory
///
/// `generate_cached` memoises renders per description; entries older than
/// the TTL are regenerated on the next read.
pub struct TemplateGenerator {
    repo: Repository,
    ttl: Duration,
    cache: HashMap<String, CachedRender>,
}

impl TemplateGenerator {
    pub fn new(repo: Repository) -> Self {
        let ttl = repo.config().cache.ttl();
        Self::with_ttl(repo, ttl)
    }

    pub fn with_ttl(repo: Repository, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            cache: HashMap::new(),
        }
    }

    fn template_dir(&self) -> &Path {
        self.repo.config().template_dir_path()
    }

    /// Names (file stems) of the available templates, sorted
    pub fn list_templates(&self) -> Result<Vec<String>> {
        let storage = self.repo.storage();
        if !storage.is_dir(self.template_dir()) {
            return Ok(Vec::new());
        }

        let mut templates: Vec<String> = storage
            .read_dir(self.template_dir())?
            .into_iter()
            .filter(|path| {
                path.extension().and_then(|s| s.to_str()) == Some(TEMPLATE_EXTENSION)
                    && !storage.is_dir(path)
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();

        templates.sort();
        Ok(templates)
    }

    /// Raw text of a template, by name with or without `.md`
    pub fn load_template(&self, name: &str) -> Result<String> {
        let file = if name.ends_with(".md") {
            name.to_string()
        } else {
            format!("{}.{}", name, TEMPLATE_EXTENSION)
        };
        let path = self.template_dir().join(file);

        if !self.repo.storage().exists(&path) {
            return Err(Error::TemplateNotFound(name.to_string()).into());
        }
        self.repo
            .storage()
            .read_to_string(&path)
            .with_context(|| format!("Failed to read template: {}", path.display()))
    }

    pub fn render(&self, name: &str, title: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        Ok(render_template(&self.load_template(name)?, title, vars, Local::now()))
    }

    /// Render through the cache, keyed by template, title and variables
    pub fn generate_cached(
        &mut self,
        name: &str,
        title: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<String> {
        let description = format!("{}\u{1f}{}\u{1f}{:?}", name, title, vars);

        if let Some(cached) = self.cache.get(&description)
            && cached.stored_at.elapsed() < self.ttl
        {
            tracing::debug!("Template cache hit for '{}'", name);
            return Ok(cached.content.clone());
        }

        tracing::debug!("Template cache miss for '{}'", name);
        let content = self.render(name, title, vars)?;
        self.cache.insert(
            description,
            CachedRender {
                content: content.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(content)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Create a note named after `title`, optionally from a template
    ///
    /// Returns the relative path of the new note. Never overwrites.
    pub fn create_note(
        &self,
        title: &str,
        template: Option<&str>,
        vars: &BTreeMap<String, String>,
    ) -> Result<PathBuf> {
        let path = PathBuf::from(format!(
            "{}.{}",
            slugify(title),
            self.repo.config().default_extension()
        ));
        self.create_note_at(&path, title, template, vars)?;
        Ok(path)
    }

    /// Create a note at an explicit path
    pub fn create_note_at(
        &self,
        path: &Path,
        title: &str,
        template: Option<&str>,
        vars: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.repo.storage().exists(path) {
            return Err(Error::NoteExists(path.to_path_buf()).into());
        }

        let content = match template {
            Some(name) => self.render(name, title, vars)?,
            None => format!("# {}\n\n", title),
        };

        self.repo.storage().write(path, &content)?;
        tracing::info!("Created note {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::storage::{MemoryStorage, Storage};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn generator(files: &[(&str, &str)], ttl: Duration) -> (TemplateGenerator, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        for (path, content) in files {
            storage.write(Path::new(path), content).unwrap();
        }
        let repo = Repository::new(storage.clone(), Arc::new(LibraryConfig::default()));
        (TemplateGenerator::with_ttl(repo, ttl), storage)
    }

    #[test]
    fn test_render_template_substitutes() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let vars = BTreeMap::from([("project".to_string(), "Apollo".to_string())]);
        let rendered = render_template(
            "# {{title}}\n{{date}} {{project}} {{unknown}}",
            "Kickoff",
            &vars,
            now,
        );
        assert_eq!(rendered, "# Kickoff\n2024-01-15 Apollo {{unknown}}");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Test Note"), "my-test-note");
        assert_eq!(slugify("2024-01-15"), "2024-01-15");
        assert_eq!(slugify("  What's up?! "), "what-s-up");
        assert_eq!(slugify("???"), "untitled");
    }

    #[test]
    fn test_list_templates() {
        let (templates, _) = generator(
            &[
                (".templates/daily.md", ""),
                (".templates/meeting.md", ""),
                (".templates/readme.txt", ""),
            ],
            Duration::from_secs(60),
        );
        assert_eq!(templates.list_templates().unwrap(), vec!["daily", "meeting"]);

        let (empty, _) = generator(&[], Duration::from_secs(60));
        assert!(empty.list_templates().unwrap().is_empty());
    }

    #[test]
    fn test_create_note_without_template() {
        let (templates, storage) = generator(&[], Duration::from_secs(60));
        let path = templates
            .create_note("My Test Note", None, &BTreeMap::new())
            .unwrap();

        assert_eq!(path, Path::new("my-test-note.md"));
        assert_eq!(storage.read_to_string(&path).unwrap(), "# My Test Note\n\n");
    }

    #[test]
    fn test_create_note_with_template() {
        let (templates, storage) = generator(
            &[(".templates/daily.md", "---\ntags: [daily]\n---\n\n# {{title}}\n\n## Tasks\n")],
            Duration::from_secs(60),
        );
        let path = templates
            .create_note("2024-01-15", Some("daily"), &BTreeMap::new())
            .unwrap();

        assert_eq!(path, Path::new("2024-01-15.md"));
        let content = storage.read_to_string(&path).unwrap();
        assert!(content.contains("# 2024-01-15"));
        assert!(content.contains("## Tasks"));
    }

    #[test]
    fn test_create_note_duplicate_error() {
        let (templates, _) = generator(&[], Duration::from_secs(60));
        templates.create_note("Test", None, &BTreeMap::new()).unwrap();
        let err = templates
            .create_note("Test", None, &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoteExists(_))));
    }

    #[test]
    fn test_template_not_found() {
        let (templates, _) = generator(&[], Duration::from_secs(60));
        let err = templates
            .create_note("Test", Some("nonexistent"), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_generate_cached_serves_fresh_entries() {
        let (mut templates, storage) = generator(
            &[(".templates/t.md", "v1 {{title}}")],
            Duration::from_secs(3600),
        );
        let vars = BTreeMap::new();
        assert_eq!(templates.generate_cached("t", "x", &vars).unwrap(), "v1 x");

        storage.write(Path::new(".templates/t.md"), "v2 {{title}}").unwrap();
        assert_eq!(templates.generate_cached("t", "x", &vars).unwrap(), "v1 x");
        assert_eq!(templates.generate_cached("t", "y", &vars).unwrap(), "v2 y");

        templates.clear_cache();
        assert_eq!(templates.generate_cached("t", "x", &vars).unwrap(), "v2 x");
    }

    #[test]
    fn test_generate_cached_expires() {
        let (mut templates, storage) = generator(&[(".templates/t.md", "v1")], Duration::ZERO);
        let vars = BTreeMap::new();
        assert_eq!(templates.generate_cached("t", "x", &vars).unwrap(), "v1");
        storage.write(Path::new(".templates/t.md"), "v2").unwrap();
        assert_eq!(templates.generate_cached("t", "x", &vars).unwrap(), "v2");
    }
}
