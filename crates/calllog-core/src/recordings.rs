//! Recording discovery
//!
//! Lists one directory below the storage root and keeps the files whose
//! name contains the filter, ignoring case. A missing or unreadable
//! directory yields an empty list rather than an error.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use url::Url;

/// Scans a storage root for call recordings
#[derive(Debug, Clone)]
pub struct RecordingScanner {
    root: PathBuf,
}

impl RecordingScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `file://` locations under `root/selected_path` whose name contains `filter`
    ///
    /// Results are sorted by file name. `selected_path` is always taken
    /// relative to the root, even when it starts with `/`; a path that
    /// climbs with `..` yields nothing.
    pub fn find(&self, filter: &str, selected_path: Option<&str>) -> Vec<Url> {
        let directory = match selected_path {
            Some(selected) => match self.resolve(selected) {
                Some(directory) => directory,
                None => {
                    warn!(target: crate::LOG_TARGET, "refusing recording path outside the storage root: {}", selected);
                    return Vec::new();
                }
            },
            None => self.root.clone(),
        };
        if !directory.is_dir() {
            debug!(target: crate::LOG_TARGET, "recording directory {} does not exist", directory.display());
            return Vec::new();
        }

        let entries = match fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(target: crate::LOG_TARGET, "cannot list {}: {}", directory.display(), err);
                return Vec::new();
            }
        };

        let needle = filter.to_lowercase();
        let mut matches: Vec<(String, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.to_lowercase()
                    .contains(&needle)
                    .then(|| (name, entry.path()))
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));

        matches
            .into_iter()
            .filter_map(|(_, path)| match Url::from_file_path(&path) {
                Ok(url) => Some(url),
                Err(()) => {
                    warn!(target: crate::LOG_TARGET, "skipping non-absolute path {}", path.display());
                    None
                }
            })
            .collect()
    }

    /// Join `selected` below the root, or `None` if it would leave it
    fn resolve(&self, selected: &str) -> Option<PathBuf> {
        let mut directory = self.root.clone();
        for component in Path::new(selected).components() {
            match component {
                Component::Normal(part) => directory.push(part),
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
                Component::ParentDir => return None,
            }
        }
        Some(directory)
    }
}
