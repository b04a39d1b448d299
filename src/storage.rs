//! Storage abstraction for file operations
//!
//! The Storage trait provides an abstraction over filesystem operations,
//! allowing the library to be tested without touching the filesystem.
//! All paths are relative to the notes directory root.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Size and timestamps of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    pub modified: SystemTime,
    /// Birth time, when the platform reports one
    pub created: Option<SystemTime>,
}

/// Storage abstraction for file operations
///
/// All paths are relative to the notes directory. Implementations
/// handle the mapping to absolute paths or in-memory storage.
pub trait Storage {
    /// Read a file to a string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write contents to a file, creating parent directories as needed
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Read the immediate entries of a directory, returning relative paths
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// List every file below a directory, skipping hidden files and directories
    fn walk_files(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Create directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Move a file to a new path
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Size and timestamps of a file
    fn metadata(&self, path: &Path) -> Result<FileStats>;
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Real filesystem storage implementation
///
/// All operations are scoped to a root directory (the notes directory).
/// Paths passed to Storage methods are interpreted relative to this root.
pub struct RealStorage {
    root: PathBuf,
}

impl RealStorage {
    /// Create a new RealStorage with the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the full path by joining with root
    fn full_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }
}

impl Storage for RealStorage {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(self.full_path(path))
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for {}", path.display()))?;
        }
        std::fs::write(full_path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.full_path(path).exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.full_path(path).is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.full_path(path);
        let entries = std::fs::read_dir(&full_path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("Failed to read entry in {}", path.display()))?;
            if let Some(relative) = self.relative(&entry.path()) {
                paths.push(relative);
            }
        }

        paths.sort();
        Ok(paths)
    }

    fn walk_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.full_path(path);
        if !full_path.exists() {
            anyhow::bail!("Notes directory not found: {}", full_path.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&full_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || e.file_name()
                        .to_str()
                        .map(|s| !is_hidden(s))
                        .unwrap_or(false)
            })
        {
            let entry = entry.context("Failed to read directory entry")?;
            if entry.file_type().is_file()
                && let Some(relative) = self.relative(entry.path())
            {
                files.push(relative);
            }
        }

        files.sort();
        Ok(files)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(self.full_path(path))
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(self.full_path(path))
            .with_context(|| format!("Failed to delete {}", path.display()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let target = self.full_path(to);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for {}", to.display()))?;
        }
        std::fs::rename(self.full_path(from), target)
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))
    }

    fn metadata(&self, path: &Path) -> Result<FileStats> {
        let meta = std::fs::metadata(self.full_path(path))
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(FileStats {
            size: meta.len(),
            modified: meta
                .modified()
                .with_context(|| format!("No modification time for {}", path.display()))?,
            created: meta.created().ok(),
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: SystemTime,
    created: SystemTime,
}

/// In-memory storage implementation for testing
///
/// Stores files in a HashMap, allowing tests to run without
/// touching the filesystem.
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
}

impl MemoryStorage {
    /// Create a new empty MemoryStorage
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, MemoryFile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Override the modification time of a stored file
    pub fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<()> {
        let mut files = self.files();
        let file = files
            .get_mut(path)
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))?;
        file.modified = modified;
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files()
            .get(path)
            .map(|f| f.contents.clone())
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let now = SystemTime::now();
        let mut files = self.files();
        let created = files.get(path).map(|f| f.created).unwrap_or(now);
        files.insert(
            path.to_path_buf(),
            MemoryFile {
                contents: contents.to_string(),
                modified: now,
                created,
            },
        );
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let is_file = self.files().contains_key(path);
        is_file || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files()
            .keys()
            .any(|k| k.starts_with(path) && k != path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files();

        let entries: BTreeSet<PathBuf> = files
            .keys()
            .filter(|k| k.starts_with(path) && *k != path)
            .filter_map(|k| {
                let rest = k.strip_prefix(path).ok()?;
                let first = rest.components().next()?;
                Some(path.join(first))
            })
            .collect();

        Ok(entries.into_iter().collect())
    }

    fn walk_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files();

        let mut entries: Vec<PathBuf> = files
            .keys()
            .filter(|k| k.starts_with(path))
            .filter(|k| {
                k.strip_prefix(path)
                    .map(|rest| {
                        !rest
                            .components()
                            .any(|c| c.as_os_str().to_str().map(is_hidden).unwrap_or(true))
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        // No-op for memory storage
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files();
        let file = files
            .remove(from)
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", from.display()))?;
        files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn metadata(&self, path: &Path) -> Result<FileStats> {
        self.files()
            .get(path)
            .map(|f| FileStats {
                size: f.contents.len() as u64,
                modified: f.modified,
                created: Some(f.created),
            })
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_memory_storage_write_read() {
        let storage = MemoryStorage::new();
        storage
            .write(Path::new("test.md"), "Hello, world!")
            .unwrap();

        let content = storage.read_to_string(Path::new("test.md")).unwrap();
        assert_eq!(content, "Hello, world!");
    }

    #[test]
    fn test_memory_storage_exists() {
        let storage = MemoryStorage::new();
        assert!(!storage.exists(Path::new("test.md")));

        storage
            .write(Path::new("test.md"), "content")
            .unwrap();
        assert!(storage.exists(Path::new("test.md")));
    }

    #[test]
    fn test_memory_storage_read_dir_lists_immediate_children() {
        let storage = MemoryStorage::new();
        storage.write(Path::new("a.md"), "a").unwrap();
        storage.write(Path::new("b.md"), "b").unwrap();
        storage.write(Path::new("dir/c.md"), "c").unwrap();
        storage.write(Path::new("dir/sub/d.md"), "d").unwrap();

        let entries = storage.read_dir(Path::new("")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("a.md"),
                PathBuf::from("b.md"),
                PathBuf::from("dir")
            ]
        );

        let entries = storage.read_dir(Path::new("dir")).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("dir/c.md"), PathBuf::from("dir/sub")]
        );
    }

    #[test]
    fn test_memory_storage_walk_skips_hidden() {
        let storage = MemoryStorage::new();
        storage.write(Path::new("a.md"), "a").unwrap();
        storage.write(Path::new("dir/c.md"), "c").unwrap();
        storage.write(Path::new(".noteweave/config.toml"), "").unwrap();
        storage.write(Path::new("dir/.hidden.md"), "").unwrap();

        let entries = storage.walk_files(Path::new("")).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("a.md"), PathBuf::from("dir/c.md")]
        );
    }

    #[test]
    fn test_memory_storage_rename_and_remove() {
        let storage = MemoryStorage::new();
        storage.write(Path::new("old.md"), "body").unwrap();

        storage
            .rename(Path::new("old.md"), Path::new("archive/new.md"))
            .unwrap();
        assert!(!storage.exists(Path::new("old.md")));
        assert_eq!(
            storage.read_to_string(Path::new("archive/new.md")).unwrap(),
            "body"
        );

        storage.remove_file(Path::new("archive/new.md")).unwrap();
        assert!(storage.remove_file(Path::new("archive/new.md")).is_err());
    }

    #[test]
    fn test_memory_storage_metadata() {
        let storage = MemoryStorage::new();
        storage.write(Path::new("a.md"), "12345").unwrap();

        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        storage.set_modified(Path::new("a.md"), past).unwrap();

        let stats = storage.metadata(Path::new("a.md")).unwrap();
        assert_eq!(stats.size, 5);
        assert_eq!(stats.modified, past);
        assert!(storage.metadata(Path::new("missing.md")).is_err());
    }

    #[test]
    fn test_real_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RealStorage::new(dir.path().to_path_buf());

        storage
            .write(Path::new("journal/2025/entry.md"), "# Entry")
            .unwrap();
        storage.write(Path::new(".git/HEAD"), "ref").unwrap();

        let files = storage.walk_files(Path::new("")).unwrap();
        assert_eq!(files, vec![PathBuf::from("journal/2025/entry.md")]);
        assert!(storage.is_dir(Path::new("journal")));
        assert_eq!(
            storage.metadata(Path::new("journal/2025/entry.md")).unwrap().size,
            7
        );
    }
}
