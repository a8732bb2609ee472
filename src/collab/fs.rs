//! File access for the working tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String>;
    async fn write(&self, path: &Path, content: &str) -> Result<()>;
    async fn exists(&self, path: &Path) -> bool;
    async fn mkdirp(&self, path: &Path) -> Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn mkdirp(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }
}

/// In-memory working tree. Writes require the parent directory to exist,
/// like the real filesystem, so directory creation is observable.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (and its parent directories).
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
        if let Ok(mut files) = self.files.lock() {
            files.insert(path, content.into());
        }
        self
    }

    /// Current content of `path`, if any.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().ok()?.get(path).cloned()
    }

    fn add_dirs(&self, path: &Path) {
        if let Ok(mut dirs) = self.dirs.lock() {
            for ancestor in path.ancestors() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
    }

    fn has_dir(&self, path: &Path) -> bool {
        path.as_os_str().is_empty()
            || self
                .dirs
                .lock()
                .map(|dirs| dirs.contains(path))
                .unwrap_or(false)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn read(&self, path: &Path) -> Result<String> {
        self.get(path)
            .ok_or_else(|| anyhow!("No such file: {}", path.display()))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent()
            && !self.has_dir(parent)
        {
            anyhow::bail!("Parent directory does not exist: {}", parent.display());
        }
        let mut files = self
            .files
            .lock()
            .map_err(|e| anyhow!("File map lock poisoned: {}", e))?;
        files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.get(path).is_some() || self.has_dir(path)
    }

    async fn mkdirp(&self, path: &Path) -> Result<()> {
        self.add_dirs(path);
        Ok(())
    }
}
