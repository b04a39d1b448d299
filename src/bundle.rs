//! Bundles: workflows that generate several linked notes at once
//!
//! A bundle is a YAML file in the bundle directory:
//!
//! ```yaml
//! name: Project kickoff
//! variables:
//!   - name: project
//!   - name: owner
//!     default: me
//! notes:
//!   - key: overview
//!     path: projects/{{project}}/overview
//!     template: project
//!   - key: tasks
//!     path: projects/{{project}}/tasks
//!     content: |
//!       # {{project}} tasks
//!       Back to [[{{link:overview}}]]
//! ```
//!
//! `{{link:<key>}}` becomes the link text of the bundle note with that key.

use crate::error::{Error, FileFailure};
use crate::repository::{Repository, path_without_extension};
use crate::template::{TemplateGenerator, render_template};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const BUNDLE_EXTENSIONS: &[&str] = &["yaml", "yml"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVariable {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleNote {
    pub key: String,
    /// Relative path, with variables; the note extension is added if missing
    pub path: String,
    /// Title for `{{title}}`; defaults to the last path segment
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<BundleVariable>,
    pub notes: Vec<BundleNote>,
}

impl Bundle {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let bundle: Bundle = serde_yaml::from_str(yaml).context("Failed to parse bundle")?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<()> {
        if self.notes.is_empty() {
            return Err(Error::InvalidBundle(format!("bundle '{}' has no notes", self.name)).into());
        }

        let mut keys = Vec::with_capacity(self.notes.len());
        for note in &self.notes {
            if keys.contains(&note.key.as_str()) {
                return Err(Error::InvalidBundle(format!("duplicate note key '{}'", note.key)).into());
            }
            keys.push(note.key.as_str());

            if note.template.is_some() == note.content.is_some() {
                return Err(Error::InvalidBundle(format!(
                    "note '{}' needs exactly one of 'template' or 'content'",
                    note.key
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Outcome of generating a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    pub created: Vec<PathBuf>,
    /// Notes not written because the path already existed
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

/// Replace every `{{link:<key>}}` using `links`
fn substitute_links(text: &str, links: &HashMap<&str, String>) -> Result<String> {
    const OPEN: &str = "{{link:";
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let key = after[..end].trim();
        let target = links
            .get(key)
            .ok_or_else(|| Error::InvalidBundle(format!("unknown link key '{}'", key)))?;

        output.push_str(&rest[..start]);
        output.push_str(target);
        rest = &after[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

pub struct BundleService {
    repo: Repository,
}

impl BundleService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    fn bundle_dir(&self) -> &Path {
        &self.repo.config().bundle_dir
    }

    /// Names of the bundle files in the bundle directory, sorted
    pub fn list_bundles(&self) -> Result<Vec<String>> {
        let storage = self.repo.storage();
        if !storage.is_dir(self.bundle_dir()) {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = storage
            .read_dir(self.bundle_dir())?
            .into_iter()
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| BUNDLE_EXTENSIONS.contains(&e))
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Load a bundle by name from the bundle directory, or by relative path
    pub fn load_bundle(&self, name: &str) -> Result<Bundle> {
        let storage = self.repo.storage();
        let direct = Path::new(name);
        let path = if direct.extension().is_some() && storage.exists(direct) {
            direct.to_path_buf()
        } else {
            BUNDLE_EXTENSIONS
                .iter()
                .map(|ext| self.bundle_dir().join(format!("{}.{}", name, ext)))
                .find(|path| storage.exists(path))
                .ok_or_else(|| Error::InvalidBundle(format!("bundle '{}' not found", name)))?
        };

        let yaml = storage.read_to_string(&path)?;
        Bundle::from_yaml(&yaml).with_context(|| format!("Invalid bundle {}", path.display()))
    }

    /// Resolve declared variables against `provided`, applying defaults
    fn variables(
        &self,
        bundle: &Bundle,
        provided: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut vars = provided.clone();
        for variable in &bundle.variables {
            if vars.contains_key(&variable.name) {
                continue;
            }
            match &variable.default {
                Some(default) => {
                    vars.insert(variable.name.clone(), default.clone());
                }
                None => return Err(Error::MissingVariable(variable.name.clone()).into()),
            }
        }
        Ok(vars)
    }

    fn note_path(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw.trim().trim_start_matches('/'));
        let config = self.repo.config();
        let has_note_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| config.note_extensions.iter().any(|n| n.eq_ignore_ascii_case(ext)));
        if has_note_extension {
            path
        } else {
            PathBuf::from(format!("{}.{}", path.display(), config.default_extension()))
        }
    }

    /// Write every note of `bundle`
    ///
    /// Notes whose path exists are skipped; a note that fails to render or
    /// write is reported and the rest still generated.
    pub fn generate(
        &self,
        bundle: &Bundle,
        provided: &BTreeMap<String, String>,
        templates: &TemplateGenerator,
    ) -> Result<BundleReport> {
        let vars = self.variables(bundle, provided)?;
        let now = Local::now();

        let planned: Vec<(&BundleNote, PathBuf, String)> = bundle
            .notes
            .iter()
            .map(|note| {
                let path = self.note_path(&render_template(&note.path, "", &vars, now));
                let title = match &note.title {
                    Some(title) => render_template(title, "", &vars, now),
                    None => path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string(),
                };
                (note, path, title)
            })
            .collect();

        let links: HashMap<&str, String> = planned
            .iter()
            .map(|(note, path, _)| (note.key.as_str(), path_without_extension(path)))
            .collect();

        let mut report = BundleReport::default();
        for (note, path, title) in &planned {
            if self.repo.storage().exists(path) {
                tracing::info!("Skipping existing note {}", path.display());
                report.skipped.push(path.clone());
                continue;
            }

            let result = match (&note.template, &note.content) {
                (Some(template), _) => templates.render(template, title, &vars),
                (None, Some(content)) => Ok(render_template(content, title, &vars, now)),
                (None, None) => Err(Error::InvalidBundle(format!("note '{}' has no body", note.key)).into()),
            }
            .and_then(|body| substitute_links(&body, &links))
            .and_then(|body| self.repo.storage().write(path, &body));

            match result {
                Ok(()) => report.created.push(path.clone()),
                Err(e) => {
                    tracing::warn!("Failed to generate {}: {:#}", path.display(), e);
                    report.failures.push(FileFailure::new(path.clone(), &e));
                }
            }
        }

        tracing::info!(
            "Bundle '{}': {} created, {} skipped, {} failed",
            bundle.name,
            report.created.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::link::extract_links;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    const KICKOFF: &str = r#"
name: Project kickoff
variables:
  - name: project
  - name: owner
    default: me
notes:
  - key: overview
    path: projects/{{project}}/overview
    template: project
  - key: tasks
    path: projects/{{project}}/tasks.md
    title: "{{project}} tasks"
    content: |
      # {{title}}
      Owner: {{owner}}
      Back to [[{{link:overview}}]]
"#;

    fn setup(files: &[(&str, &str)]) -> (BundleService, TemplateGenerator, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        for (path, content) in files {
            storage.write(Path::new(path), content).unwrap();
        }
        let repo = Repository::new(storage.clone(), Arc::new(LibraryConfig::default()));
        (
            BundleService::new(repo.clone()),
            TemplateGenerator::new(repo),
            storage,
        )
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_generate_links_notes_together() {
        let (bundles, templates, storage) = setup(&[
            (".templates/project.md", "# {{title}}\nSee [[{{link:tasks}}]]\n"),
            (".noteweave/bundles/kickoff.yaml", KICKOFF),
        ]);

        let bundle = bundles.load_bundle("kickoff").unwrap();
        let report = bundles
            .generate(&bundle, &vars(&[("project", "apollo")]), &templates)
            .unwrap();

        assert_eq!(
            report.created,
            vec![
                PathBuf::from("projects/apollo/overview.md"),
                PathBuf::from("projects/apollo/tasks.md"),
            ]
        );

        let overview = storage
            .read_to_string(Path::new("projects/apollo/overview.md"))
            .unwrap();
        assert_eq!(overview, "# overview\nSee [[projects/apollo/tasks]]\n");

        let tasks = storage
            .read_to_string(Path::new("projects/apollo/tasks.md"))
            .unwrap();
        assert!(tasks.starts_with("# apollo tasks\nOwner: me\n"));
        let links = extract_links(&tasks);
        assert_eq!(links[0].link_text, "projects/apollo/overview");
    }

    #[test]
    fn test_missing_variable() {
        let (bundles, templates, _) = setup(&[]);
        let bundle = Bundle::from_yaml(KICKOFF).unwrap();
        let err = bundles
            .generate(&bundle, &BTreeMap::new(), &templates)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingVariable(name)) if name == "project"
        ));
    }

    #[test]
    fn test_existing_notes_are_skipped_and_failures_reported() {
        let (bundles, templates, storage) = setup(&[("projects/x/tasks.md", "mine")]);
        let bundle = Bundle::from_yaml(KICKOFF).unwrap();

        let report = bundles
            .generate(&bundle, &vars(&[("project", "x")]), &templates)
            .unwrap();

        // The overview template is missing
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("projects/x/overview.md"));
        assert_eq!(report.skipped, vec![PathBuf::from("projects/x/tasks.md")]);
        assert!(report.created.is_empty());
        assert_eq!(
            storage.read_to_string(Path::new("projects/x/tasks.md")).unwrap(),
            "mine"
        );
    }

    #[test]
    fn test_invalid_bundles() {
        let both = "name: b\nnotes:\n  - key: a\n    path: a\n    template: t\n    content: c\n";
        let duplicate = "name: b\nnotes:\n  - key: a\n    path: a\n    content: c\n  - key: a\n    path: b\n    content: c\n";
        let empty = "name: b\nnotes: []\n";
        for yaml in [both, duplicate, empty] {
            let err = Bundle::from_yaml(yaml).unwrap_err();
            assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidBundle(_))), "{yaml}");
        }
        assert!(Bundle::from_yaml("not: [valid").is_err());
    }

    #[test]
    fn test_unknown_link_key() {
        let (bundles, templates, _) = setup(&[]);
        let bundle =
            Bundle::from_yaml("name: b\nnotes:\n  - key: a\n    path: a\n    content: \"{{link:zzz}}\"\n")
                .unwrap();
        let report = bundles.generate(&bundle, &BTreeMap::new(), &templates).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("zzz"));
    }

    #[test]
    fn test_list_bundles() {
        let (bundles, _, _) = setup(&[
            (".noteweave/bundles/kickoff.yaml", KICKOFF),
            (".noteweave/bundles/retro.yml", KICKOFF),
            (".noteweave/bundles/notes.txt", ""),
        ]);
        assert_eq!(bundles.list_bundles().unwrap(), vec!["kickoff", "retro"]);
    }
}
