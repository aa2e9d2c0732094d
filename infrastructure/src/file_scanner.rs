use domain::error::{IngestionError, LoadError};
use domain::models::{Document, META_RELATIVE_PATH};
use rayon::prelude::*;
use shared::utils::has_suffix;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Walks a notes directory and turns every file with an accepted suffix
/// into a [`Document`]. Unreadable files are skipped, not fatal.
pub struct FileScanner {
    root_path: PathBuf,
    suffixes: Vec<String>,
    ignored_dirs: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<LoadError>,
}

impl FileScanner {
    pub fn new(root_path: impl Into<PathBuf>, suffixes: &[String]) -> Self {
        Self {
            root_path: root_path.into(),
            suffixes: suffixes.to_vec(),
            ignored_dirs: HashSet::new(),
        }
    }

    /// Directory names (not paths) that are never descended into.
    pub fn with_ignored_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn load(&self) -> Result<Vec<Document>, IngestionError> {
        self.load_with_report().map(|report| report.documents)
    }

    /// Load every eligible file, sorted by path. Fails only when the root
    /// cannot be listed or nothing at all could be loaded.
    pub fn load_with_report(&self) -> Result<LoadReport, IngestionError> {
        let mut skipped = Vec::new();
        let files = self.collect_files(&mut skipped)?;
        tracing::info!(
            "Found {} note files under {}",
            files.len(),
            self.root_path.display()
        );

        let results: Vec<Result<Document, LoadError>> = files
            .par_iter()
            .map(|path| self.load_document(path))
            .collect();

        let mut documents = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!("{err}");
                    skipped.push(err);
                }
            }
        }

        if documents.is_empty() {
            return Err(IngestionError::NoDocuments {
                root: self.root_path.clone(),
                suffixes: self.suffixes.join(", "),
                failed: skipped.len(),
            });
        }
        Ok(LoadReport { documents, skipped })
    }

    fn collect_files(&self, skipped: &mut Vec<LoadError>) -> Result<Vec<PathBuf>, IngestionError> {
        let entries = fs::read_dir(&self.root_path).map_err(|source| IngestionError::RootUnreadable {
            root: self.root_path.clone(),
            source,
        })?;
        let mut files = Vec::new();
        self.collect_entries(&self.root_path, entries, &mut files, skipped);
        files.sort();
        Ok(files)
    }

    fn collect_entries(
        &self,
        dir: &Path,
        entries: fs::ReadDir,
        files: &mut Vec<PathBuf>,
        skipped: &mut Vec<LoadError>,
    ) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    tracing::warn!("Error listing directory {}: {source}", dir.display());
                    skipped.push(LoadError::Directory {
                        path: dir.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };
            let path = entry.path();
            // Symlinked directories are not followed, so a link cycle cannot recurse forever.
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if self.ignored_dirs.contains(name) {
                        continue;
                    }
                }
                match fs::read_dir(&path) {
                    Ok(children) => self.collect_entries(&path, children, files, skipped),
                    Err(source) => {
                        tracing::warn!("Error listing directory {}: {source}", path.display());
                        skipped.push(LoadError::Directory { path, source });
                    }
                }
            } else if has_suffix(&path, &self.suffixes) {
                files.push(path);
            }
        }
    }

    fn load_document(&self, path: &Path) -> Result<Document, LoadError> {
        let bytes = fs::read(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|_| LoadError::NotUtf8 {
            path: path.to_path_buf(),
        })?;
        let relative = path.strip_prefix(&self.root_path).unwrap_or(path);
        Ok(Document::new(path.to_string_lossy(), content)
            .with_metadata(META_RELATIVE_PATH, relative.to_string_lossy()))
    }
}
