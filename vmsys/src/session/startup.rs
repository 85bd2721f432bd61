use tracing::debug;

use crate::error::VmError;
use crate::models::StartupFile;
use crate::runtime::ScriptRuntime;
use crate::sandbox::{RelWorktreePath, WorktreeRoot};

/// Run each startup file in ascending `order_index`.
///
/// Path violations surface as `PathTraversal`, a missing file as
/// `FileNotFound`, an unknown mode as `StartupModeUnsupported` and a script
/// error as `StartupFailed`. The first failure stops the sequence.
pub(super) fn run_startup_files(
    runtime: &ScriptRuntime,
    root: &WorktreeRoot,
    mut files: Vec<StartupFile>,
) -> Result<(), VmError> {
    files.sort_by_key(|f| f.order_index);

    for file in files {
        let rel = RelWorktreePath::parse(&file.path)
            .map_err(|e| VmError::from_sandbox(&file.path, e))?;
        let resolved = root
            .resolve(&rel)
            .map_err(|e| VmError::from_sandbox(&file.path, e))?;

        let content = match std::fs::read(resolved.absolute()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VmError::FileNotFound { path: file.path });
            }
            Err(e) => return Err(VmError::Io(e)),
        };

        match file.mode.trim() {
            "" | "eval" => {}
            other => {
                return Err(VmError::StartupModeUnsupported {
                    mode: other.to_string(),
                });
            }
        }

        runtime
            .eval(content)?
            .map_err(|exception| VmError::StartupFailed {
                path: file.path.clone(),
                message: exception.message,
            })?;
        debug!(path = %file.path, order_index = file.order_index, "startup file executed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionId, TemplateId};
    use tempfile::TempDir;

    fn file(path: &str, order_index: i64, mode: &str) -> StartupFile {
        StartupFile {
            id: format!("sf-{order_index}"),
            template_id: TemplateId::new(),
            path: path.to_string(),
            order_index,
            mode: mode.to_string(),
        }
    }

    fn setup() -> (TempDir, WorktreeRoot, ScriptRuntime) {
        let temp = TempDir::new().unwrap();
        let root = WorktreeRoot::new(temp.path()).unwrap();
        let runtime = ScriptRuntime::spawn(&SessionId::new(), root.clone()).unwrap();
        (temp, root, runtime)
    }

    #[test]
    fn test_files_run_in_order_index_order() {
        let (temp, root, runtime) = setup();
        std::fs::write(temp.path().join("a.js"), "var log = (typeof log === 'undefined' ? '' : log) + 'a';").unwrap();
        std::fs::write(temp.path().join("b.js"), "var log = (typeof log === 'undefined' ? '' : log) + 'b';").unwrap();

        run_startup_files(&runtime, &root, vec![file("b.js", 2, "eval"), file("a.js", 1, "")]).unwrap();
        assert_eq!(runtime.eval("log").unwrap().unwrap().preview, "ab");
    }

    #[test]
    fn test_traversal_is_path_traversal() {
        let (_temp, root, runtime) = setup();
        let err = run_startup_files(&runtime, &root, vec![file("../init.js", 1, "eval")]).unwrap_err();
        assert_eq!(err.code(), "PATH_TRAVERSAL");
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let (_temp, root, runtime) = setup();
        let err = run_startup_files(&runtime, &root, vec![file("nope.js", 1, "eval")]).unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_import_mode_is_unsupported() {
        let (temp, root, runtime) = setup();
        std::fs::write(temp.path().join("m.js"), "var m = 1;").unwrap();
        let err = run_startup_files(&runtime, &root, vec![file("m.js", 1, "import")]).unwrap_err();
        assert!(matches!(err, VmError::StartupModeUnsupported { ref mode } if mode == "import"));
    }

    #[test]
    fn test_script_error_is_startup_failed_and_stops() {
        let (temp, root, runtime) = setup();
        std::fs::write(temp.path().join("bad.js"), "throw new Error('init broke');").unwrap();
        std::fs::write(temp.path().join("later.js"), "var later = true;").unwrap();

        let err = run_startup_files(
            &runtime,
            &root,
            vec![file("bad.js", 1, "eval"), file("later.js", 2, "eval")],
        )
        .unwrap_err();
        assert_eq!(err.code(), "STARTUP_FAILED");
        assert!(err.to_string().contains("init broke"));
        assert_eq!(runtime.eval("typeof later").unwrap().unwrap().preview, "undefined");
    }
}
