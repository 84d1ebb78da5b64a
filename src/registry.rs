//! Source Registry - discovers per-user history databases
//!
//! Every regular file directly inside the history directory is one user's
//! source database; the file's base name is the username.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Mapping of username to source database path
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, PathBuf>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// List regular files directly inside `directory`. Does not recurse.
    pub fn discover(directory: &Path) -> Result<Self> {
        let mut sources = HashMap::new();

        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                tracing::debug!("Skipping non-file entry {}", path.display());
                continue;
            }
            if let Some(name) = path.file_name() {
                sources.insert(name.to_string_lossy().to_string(), path);
            }
        }

        tracing::debug!("Discovered {} history files in {}", sources.len(), directory.display());
        Ok(Self { sources })
    }

    /// Build a registry from explicit source files
    pub fn from_paths<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut registry = Self::new();
        for path in paths {
            let path = path.into();
            let name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| Error::InvalidArgument(format!("{} has no file name", path.display())))?;
            registry.insert(name, path)?;
        }
        Ok(registry)
    }

    /// Register a source under `username`; a username can only be registered once
    pub fn insert(&mut self, username: impl Into<String>, path: impl Into<PathBuf>) -> Result<()> {
        let username = username.into();
        if self.sources.contains_key(&username) {
            return Err(Error::InvalidArgument(format!(
                "duplicate history name: {}",
                username
            )));
        }
        self.sources.insert(username, path.into());
        Ok(())
    }

    pub fn get(&self, username: &str) -> Option<&Path> {
        self.sources.get(username).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources ordered by username, for reproducible import runs
    pub fn sorted(&self) -> Vec<(&str, &Path)> {
        let mut entries: Vec<_> = self
            .sources
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Discover the sources inside `directory`
pub fn discover(directory: &Path) -> Result<SourceRegistry> {
    SourceRegistry::discover(directory)
}
