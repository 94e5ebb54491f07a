use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use rayon::prelude::*;

use crate::{
    document::{Document, DocumentSource, read_failure},
    error::{Error, Result},
};

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

/// Supported file extensions for document discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Recursively walk a directory and discover eligible document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns files with supported extensions (.md, .txt).
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

/// Walk `current`. Failing to list `current` itself is an error; anything
/// unreadable below it is logged and skipped.
fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %current.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping entry: {e}");
                continue;
            }
        };

        if file_type.is_dir() {
            if let Err(e) = walk_dir(root, &path, results) {
                tracing::warn!(
                    path = %path.display(),
                    "skipping unreadable directory: {e}"
                );
            }
        } else if file_type.is_symlink() {
            let resolved = match path.canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // Skip broken symlinks
            };
            // Directory symlinks are not followed (cycle prevention).
            if resolved.is_file() && is_supported(&resolved) {
                results.push(make_discovered(root, &path, &resolved));
            }
        } else if file_type.is_file() && is_supported(&path) {
            match path.canonicalize() {
                Ok(abs) => results.push(make_discovered(root, &path, &abs)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping file: {e}");
                }
            }
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
    }
}

/// Reads every supported file under a directory as a [`Document`].
///
/// Document IDs are the paths relative to the root, so the corpus order is
/// the sorted path order. Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    filter: Option<GlobMatcher>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: None,
        }
    }

    /// Only ingest files whose relative path matches `pattern`.
    pub fn with_glob(mut self, pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid glob pattern '{pattern}': {e}"))
        })?;
        self.filter = Some(glob.compile_matcher());
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, file: &DiscoveredFile) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|m| m.is_match(&file.relative_path))
    }
}

impl DocumentSource for DirectorySource {
    fn list_documents(&self) -> Result<Vec<Result<Document>>> {
        let files: Vec<DiscoveredFile> = discover_files(&self.root)?
            .into_iter()
            .filter(|f| self.matches(f))
            .collect();

        // Read in parallel; collect keeps the sorted discovery order.
        let documents = files
            .par_iter()
            .map(|file| {
                let id = file.relative_path.to_string_lossy().to_string();
                match std::fs::read(&file.absolute_path) {
                    Ok(bytes) => Ok(Document {
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        id,
                    }),
                    Err(e) => Err(read_failure(&id, e)),
                }
            })
            .collect();

        Ok(documents)
    }
}
