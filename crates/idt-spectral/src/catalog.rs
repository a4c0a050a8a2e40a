//! Ordered search over spectral database directories.
//!
//! The database layout groups files by kind:
//!
//! ```text
//! <root>/camera/*.json
//! <root>/illuminant/*.json
//! <root>/training/*.json
//! <root>/cmf/*.json
//! ```
//!
//! Several roots can be active at once (a user database shadowing the
//! system one); they are searched in order.

use std::path::{Path, PathBuf};

use crate::{SpectralData, SpectralError, SpectralResult};

/// Searches an ordered list of database directories for spectral data.
#[derive(Debug, Clone, Default)]
pub struct DataCatalog {
    directories: Vec<PathBuf>,
}

impl DataCatalog {
    /// Creates a catalog over the given search directories, in priority
    /// order.
    pub fn new(directories: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            directories: directories.into_iter().map(Into::into).collect(),
        }
    }

    /// The search directories, in priority order.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Enumerates every JSON file under `{dir}/{kind}/` across all search
    /// directories.
    ///
    /// Missing directories are logged as warnings, not errors: a user
    /// database does not have to provide every kind.
    pub fn collect_files(&self, kind: &str) -> Vec<PathBuf> {
        let mut result = Vec::new();

        for directory in &self.directories {
            if !directory.is_dir() {
                tracing::warn!(
                    "database location '{}' is not a directory",
                    directory.display()
                );
                continue;
            }

            let kind_path = directory.join(kind);
            if !kind_path.exists() {
                tracing::warn!(
                    "directory '{}' does not exist",
                    kind_path.display()
                );
                continue;
            }

            let Ok(entries) = std::fs::read_dir(&kind_path) else {
                tracing::warn!(
                    "failed to list directory '{}'",
                    kind_path.display()
                );
                continue;
            };

            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension() == Some(std::ffi::OsStr::new("json"))
                })
                .collect();
            // Directory iteration order is platform-defined; sort for
            // deterministic catalog enumeration.
            files.sort();
            result.extend(files);
        }

        result
    }

    /// Loads a spectral data file, resolving a relative path against each
    /// search directory in order. An absolute path is loaded directly.
    pub fn load_spectral_data(
        &self,
        path: impl AsRef<Path>,
        reshape: bool,
    ) -> SpectralResult<SpectralData> {
        let path = path.as_ref();

        if path.is_absolute() {
            return SpectralData::load(path, reshape);
        }

        for directory in &self.directories {
            let candidate = directory.join(path);
            if candidate.exists() {
                return SpectralData::load(candidate, reshape);
            }
        }

        Err(SpectralError::FileNotFound { path: path.to_path_buf() })
    }
}
