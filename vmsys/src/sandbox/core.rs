use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::SandboxError;
use super::scopes::{self, normalize_path_lexically};
use super::types::{RelWorktreePath, ResolvedWorktreePath};

/// Upper bound on dangling-link hops followed while resolving a missing path.
const MAX_LINK_HOPS: usize = 40;

/// An absolute, symlink-canonicalized worktree directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorktreeRoot {
    canonical: PathBuf,
}

impl WorktreeRoot {
    /// Canonicalize `path` into a worktree root.
    ///
    /// Fails with [`SandboxError::InvalidRoot`] when the path is empty or cannot
    /// be resolved and [`SandboxError::RootNotDirectory`] when it is a file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let path = path.as_ref();
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(SandboxError::InvalidRoot {
                path: path.to_path_buf(),
                reason: "path is empty".to_string(),
            });
        }

        let invalid = |e: io::Error| SandboxError::InvalidRoot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let absolute = std::path::absolute(path).map_err(invalid)?;
        let metadata = fs::metadata(&absolute).map_err(invalid)?;
        if !metadata.is_dir() {
            return Err(SandboxError::RootNotDirectory { path: absolute });
        }

        let canonical = fs::canonicalize(&absolute).map_err(invalid)?;
        Ok(Self { canonical })
    }

    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Join `path` to the root, resolve symlinks and confirm the result is
    /// still inside the root.
    ///
    /// Targets that do not exist yet are accepted so code can create them; the
    /// deepest existing ancestor is canonicalized and the missing tail appended.
    pub fn resolve(&self, path: &RelWorktreePath) -> Result<ResolvedWorktreePath, SandboxError> {
        let candidate = self.canonical.join(path.as_path());
        let display = path.to_string();

        let resolved = match fs::canonicalize(&candidate) {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == io::ErrorKind::NotFound => resolve_missing(&candidate)
                .map_err(|source| SandboxError::ResolveFailed {
                    path: display.clone(),
                    source,
                })?,
            Err(source) => {
                return Err(SandboxError::ResolveFailed {
                    path: display,
                    source,
                });
            }
        };

        let relative = match resolved.strip_prefix(&self.canonical) {
            Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                return Err(SandboxError::PathEscapesRoot {
                    path: display,
                    root: self.canonical.clone(),
                });
            }
        };

        Ok(ResolvedWorktreePath {
            root: self.clone(),
            relative,
            absolute: resolved,
        })
    }
}

impl RelWorktreePath {
    /// Validate caller input as a worktree-relative path.
    pub fn parse(path: &str) -> Result<Self, SandboxError> {
        if path.trim().is_empty() {
            return Err(SandboxError::EmptyRelativePath);
        }

        let raw = Path::new(path);
        if raw.is_absolute() || raw.has_root() {
            return Err(SandboxError::AbsoluteRelativePath {
                path: path.to_string(),
            });
        }

        let clean = normalize_path_lexically(raw);
        if clean.as_os_str().is_empty() {
            return Err(SandboxError::EmptyRelativePath);
        }
        if scopes::climbs_out(&clean) {
            return Err(SandboxError::TraversalRelativePath {
                path: path.to_string(),
            });
        }

        Ok(Self(clean))
    }
}

/// Resolve a path whose final components do not exist.
///
/// Walks up to the deepest existing ancestor. Dangling symlinks met on the way
/// are followed through their target so a link pointing outside the root is
/// still seen as outside.
fn resolve_missing(candidate: &Path) -> io::Result<PathBuf> {
    let mut cursor = candidate.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    let mut hops = 0;

    loop {
        match fs::symlink_metadata(&cursor) {
            Ok(meta) if meta.file_type().is_symlink() => match fs::canonicalize(&cursor) {
                Ok(base) => return Ok(append_tail(base, &tail)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return Err(io::Error::other("too many levels of symbolic links"));
                    }
                    let target = fs::read_link(&cursor)?;
                    let parent = cursor.parent().unwrap_or_else(|| Path::new("/"));
                    cursor = normalize_path_lexically(&parent.join(target));
                }
                Err(e) => return Err(e),
            },
            Ok(_) => return Ok(append_tail(fs::canonicalize(&cursor)?, &tail)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let Some(name) = cursor.file_name().map(|n| n.to_os_string()) else {
                    return Err(e);
                };
                tail.push(name);
                if !cursor.pop() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn append_tail(base: PathBuf, tail: &[OsString]) -> PathBuf {
    tail.iter().rev().fold(base, |acc, name| acc.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_empty_path() {
        let err = WorktreeRoot::new("   ").unwrap_err();
        assert!(matches!(err, SandboxError::InvalidRoot { .. }));
    }

    #[test]
    fn test_new_rejects_missing_path() {
        let temp = TempDir::new().unwrap();
        let err = WorktreeRoot::new(temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidRoot { .. }));
    }

    #[test]
    fn test_new_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let err = WorktreeRoot::new(&file).unwrap_err();
        assert!(matches!(err, SandboxError::RootNotDirectory { .. }));
    }

    #[test]
    fn test_parse_normalizes_inner_parent_segments() {
        let rel = RelWorktreePath::parse("a/../a/b").unwrap();
        assert_eq!(rel.as_path(), Path::new("a/b"));
        assert_eq!(rel.to_string(), "a/b");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            RelWorktreePath::parse(""),
            Err(SandboxError::EmptyRelativePath)
        ));
        assert!(matches!(
            RelWorktreePath::parse(" \t"),
            Err(SandboxError::EmptyRelativePath)
        ));
        assert!(matches!(
            RelWorktreePath::parse("."),
            Err(SandboxError::EmptyRelativePath)
        ));
        assert!(matches!(
            RelWorktreePath::parse("/etc/passwd"),
            Err(SandboxError::AbsoluteRelativePath { .. })
        ));
        assert!(matches!(
            RelWorktreePath::parse("../x"),
            Err(SandboxError::TraversalRelativePath { .. })
        ));
        assert!(matches!(
            RelWorktreePath::parse(".."),
            Err(SandboxError::TraversalRelativePath { .. })
        ));
        assert!(matches!(
            RelWorktreePath::parse("a/../../x"),
            Err(SandboxError::TraversalRelativePath { .. })
        ));
    }

    #[test]
    fn test_resolve_existing_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/main.js"), "1").unwrap();

        let root = WorktreeRoot::new(temp.path()).unwrap();
        let resolved = root
            .resolve(&RelWorktreePath::parse("src/main.js").unwrap())
            .unwrap();

        assert_eq!(resolved.relative(), Path::new("src/main.js"));
        assert_eq!(
            resolved.absolute(),
            fs::canonicalize(temp.path().join("src/main.js")).unwrap()
        );
        assert_eq!(resolved.root(), &root);
    }

    #[test]
    fn test_resolve_missing_target_uses_joined_path() {
        let temp = TempDir::new().unwrap();
        let root = WorktreeRoot::new(temp.path()).unwrap();

        let resolved = root
            .resolve(&RelWorktreePath::parse("out/new/file.txt").unwrap())
            .unwrap();

        assert_eq!(resolved.relative(), Path::new("out/new/file.txt"));
        assert_eq!(resolved.absolute(), root.canonical().join("out/new/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_pointing_outside() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("inner")).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("inner/link")).unwrap();

        let root = WorktreeRoot::new(temp.path()).unwrap();
        let err = root
            .resolve(&RelWorktreePath::parse("inner/link/secret.txt").unwrap())
            .unwrap_err();
        assert!(matches!(err, SandboxError::PathEscapesRoot { .. }));
        assert!(err.is_traversal());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_dangling_symlink_pointing_outside() {
        let outside = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("not-yet.txt"),
            temp.path().join("dangling"),
        )
        .unwrap();

        let root = WorktreeRoot::new(temp.path()).unwrap();
        let err = root
            .resolve(&RelWorktreePath::parse("dangling").unwrap())
            .unwrap_err();
        assert!(matches!(err, SandboxError::PathEscapesRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rewrites_internal_symlink_to_target() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/lib.js"), "1").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let root = WorktreeRoot::new(temp.path()).unwrap();
        let resolved = root
            .resolve(&RelWorktreePath::parse("alias/lib.js").unwrap())
            .unwrap();
        assert_eq!(resolved.relative(), Path::new("real/lib.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_root_through_symlink_is_canonicalized() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real_root")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real_root"), temp.path().join("alias_root"))
            .unwrap();

        let root = WorktreeRoot::new(temp.path().join("alias_root")).unwrap();
        assert_eq!(
            root.canonical(),
            fs::canonicalize(temp.path().join("real_root")).unwrap()
        );
    }
}
