//! Module sources: locations that hold candidate module packages.

use crate::error::LoaderError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A discovered package that has not been loaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position in discovery order
    pub index: usize,
    pub path: PathBuf,
}

impl Candidate {
    /// File name used to identify the candidate in logs and reports.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A location containing candidate modules.
///
/// Listing must not have side effects. An empty location is a successful,
/// empty listing; only an unreadable location is an error.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Lists every candidate in a deterministic order.
    async fn list_candidates(&self) -> Result<Vec<Candidate>, LoaderError>;

    /// Human-readable description of the location.
    fn location(&self) -> String;
}

/// Scans a single directory for files with the module package extension.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    directory: PathBuf,
    extension: String,
}

impl DirectorySource {
    /// Creates a source filtering by the host platform's dynamic library
    /// extension (`so`, `dylib` or `dll`).
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self::with_extension(directory, std::env::consts::DLL_EXTENSION)
    }

    pub fn with_extension(directory: impl AsRef<Path>, extension: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn unavailable(&self, source: std::io::Error) -> LoaderError {
        LoaderError::SourceUnavailable {
            location: self.location(),
            source,
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ModuleSource for DirectorySource {
    async fn list_candidates(&self) -> Result<Vec<Candidate>, LoaderError> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| self.unavailable(e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.unavailable(e))? {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_file() || file_type.is_symlink())
                .unwrap_or(false);

            if is_file && self.matches_extension(&path) {
                paths.push(path);
            } else {
                debug!("Skipping non-module entry: {}", path.display());
            }
        }

        // read_dir order is platform dependent
        paths.sort();

        Ok(paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Candidate { index, path })
            .collect())
    }

    fn location(&self) -> String {
        self.directory.display().to_string()
    }
}
