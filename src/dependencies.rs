//! Finds the external binaries: first on the search path, then in the
//! managed install directory.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Result of one dependency check cycle. A field is `Some` only if the
/// binary existed when the check ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyPaths {
    pub downloader: Option<PathBuf>,
    pub muxer: Option<PathBuf>,
}

impl DependencyPaths {
    pub fn is_ready(&self) -> bool {
        self.downloader.is_some() && self.muxer.is_some()
    }

    /// Directory handed to the downloader as the muxer location hint.
    pub fn muxer_dir(&self) -> Option<&Path> {
        self.muxer.as_deref().and_then(Path::parent)
    }
}

#[derive(Debug, Clone)]
pub struct DependencyLocator {
    search_dirs: Vec<PathBuf>,
    managed_dir: PathBuf,
}

impl DependencyLocator {
    pub fn new(search_dirs: Vec<PathBuf>, managed_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dirs,
            managed_dir: managed_dir.into(),
        }
    }

    pub fn from_env(managed_dir: impl Into<PathBuf>) -> Self {
        let search_dirs = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self::new(search_dirs, managed_dir)
    }

    /// Never fails: when nothing is on the search path the managed location
    /// is returned whether or not it exists.
    pub fn locate(&self, name: &str) -> PathBuf {
        let file_name = binary_file_name(name);
        self.search_dirs
            .iter()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| self.managed_dir.join(&file_name))
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn check(&self, downloader: &str, muxer: &str) -> DependencyPaths {
        let resolve = |name: &str| {
            let path = self.locate(name);
            let found = self.exists(&path);
            debug!(name, path = %path.display(), found, "dependency probe");
            found.then_some(path)
        };

        DependencyPaths {
            downloader: resolve(downloader),
            muxer: resolve(muxer),
        }
    }
}

/// Appends the platform executable suffix (`.exe` on Windows) when missing.
pub fn binary_file_name(name: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || name.to_ascii_lowercase().ends_with(suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}
