//! Temporary worktree, library cache and template scaffolding.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use super::stores::FailingStore;
use crate::control::{CreateSessionInput, Core, TemplateService};
use crate::models::TemplateId;
use crate::store::LibraryCache;

/// One template over a fresh worktree and library cache.
///
/// The store starts without faults; arm them through [`Fixture::store`].
pub struct Fixture {
    worktree: TempDir,
    cache: TempDir,
    store: Arc<FailingStore>,
    template_id: TemplateId,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let worktree = TempDir::new().context("create worktree dir")?;
        let cache = TempDir::new().context("create library cache dir")?;
        let store = Arc::new(FailingStore::new());
        let template = TemplateService::new(store.clone()).create("fixture", None)?;
        Ok(Self {
            worktree,
            cache,
            store,
            template_id: template.id,
        })
    }

    pub fn worktree(&self) -> &Path {
        self.worktree.path()
    }

    pub fn store(&self) -> &Arc<FailingStore> {
        &self.store
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn templates(&self) -> TemplateService {
        TemplateService::new(self.store.clone())
    }

    pub fn libraries(&self) -> Arc<LibraryCache> {
        Arc::new(LibraryCache::new(self.cache.path()))
    }

    /// Services over the fixture's store. Each call starts with an empty
    /// session table.
    pub fn core(&self) -> Core {
        Core::new(self.store.clone(), self.libraries())
    }

    pub fn session_input(&self) -> CreateSessionInput {
        CreateSessionInput {
            template_id: self.template_id.clone(),
            workspace_id: "ws-fixture".to_string(),
            base_commit_ref: "main".to_string(),
            worktree_path: self.worktree.path().to_path_buf(),
        }
    }

    /// Write `contents` to `rel` under the worktree, creating parent dirs.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        write_under(self.worktree.path(), rel, contents)
    }

    pub fn write_library(&self, name: &str, contents: &str) -> Result<PathBuf> {
        write_under(self.cache.path(), &format!("{name}.js"), contents)
    }
}

fn write_under(dir: &Path, rel: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
