use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically (without filesystem access).
///
/// `.` segments are dropped and `..` pops the previous normal segment. Leading
/// `..` segments of a relative path are kept, so callers can still see that the
/// path climbs above its starting point.
pub fn normalize_path_lexically(path: &Path) -> PathBuf {
    let mut stack: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match stack.last() {
                Some(Component::Normal(_)) => {
                    stack.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => stack.push(component),
            },
            c => stack.push(c),
        }
    }

    stack.iter().collect()
}

/// True when a relative path is `..` or starts with a `..` segment.
pub(super) fn climbs_out(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::ParentDir))
}
