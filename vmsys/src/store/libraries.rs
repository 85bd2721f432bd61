use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{LibrarySource, StoreError, StoreResult};

/// Library sources cached on disk as `<dir>/<name>.js`.
#[derive(Debug, Clone)]
pub struct LibraryCache {
    dir: PathBuf,
}

impl LibraryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.js"))
    }
}

impl LibrarySource for LibraryCache {
    fn load(&self, name: &str) -> StoreResult<Vec<u8>> {
        // Names are plain identifiers; anything path-like never reaches disk.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(StoreError::NotFound {
                entity: "library",
                id: format!("{name} (invalid library name)"),
            });
        }

        let path = self.path_for(name);
        debug!(library = name, path = %path.display(), "reading cached library");
        std::fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                entity: "library",
                id: format!("{name} not found in cache"),
            },
            _ => StoreError::Backend(format!("failed to read library {name}: {e}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_reads_named_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("lodash.js"), "var _ = {};").unwrap();

        let cache = LibraryCache::new(temp.path());
        assert_eq!(cache.load("lodash").unwrap(), b"var _ = {};");
    }

    #[test]
    fn test_missing_library_reports_not_in_cache() {
        let temp = TempDir::new().unwrap();
        let err = LibraryCache::new(temp.path()).load("moment").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("moment not found in cache"));
    }

    #[test]
    fn test_path_like_names_are_rejected() {
        let temp = TempDir::new().unwrap();
        let cache = LibraryCache::new(temp.path().join("libs"));
        std::fs::write(temp.path().join("secret.js"), "1").unwrap();
        assert!(cache.load("../secret").is_err());
        assert!(cache.load("a/b").is_err());
    }
}
