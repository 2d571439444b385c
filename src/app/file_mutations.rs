//! Create, rename and delete against the server, with tab bookkeeping.
//!
//! The local tree is never patched here: a confirmed mutation shows up through
//! the next pushed snapshot, and the refresh hook is triggered so a host
//! without a live subscription still converges. Rejections become a
//! dismissible error message.

use crate::file_tree::merge;
use crate::model::{FileNode, NodeKind, TabStore};
use crate::primitives::path_utils;
use crate::services::api::{ApiError, FileApi};
use rust_i18n::t;
use std::fmt;
use std::sync::Arc;

/// Callback run after every confirmed mutation.
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Rejected locally; no request was sent.
    Validation(String),
    /// A dirty tab could not be flushed; the rename was not attempted.
    SaveFailed { path: String, source: ApiError },
    /// The server refused the request.
    Rejected(ApiError),
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationError::Validation(msg) => write!(f, "{}", msg),
            MutationError::SaveFailed { path, source } => {
                write!(f, "Failed to save '{}': {}", path, source)
            }
            MutationError::Rejected(source) => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for MutationError {}

pub struct MutationCoordinator {
    api: Arc<dyn FileApi>,
    root: String,
    tabs: TabStore,
    error: Option<String>,
    status: Option<String>,
    refresh: Option<RefreshHook>,
}

impl MutationCoordinator {
    pub fn new(api: Arc<dyn FileApi>, root: &str) -> Self {
        Self {
            api,
            root: path_utils::normalize_root(root),
            tabs: TabStore::new(),
            error: None,
            status: None,
            refresh: None,
        }
    }

    pub fn with_refresh_hook(mut self, hook: RefreshHook) -> Self {
        self.refresh = Some(hook);
        self
    }

    pub fn set_root(&mut self, root: &str) {
        self.root = path_utils::normalize_root(root);
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    /// Install a tab mapping produced by the editing flow.
    pub fn set_tabs(&mut self, tabs: TabStore) {
        self.tabs = tabs;
    }

    /// The error message shown next to the action that failed, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Create a file or folder named `name` under `parent` (root when `None`).
    pub async fn create(
        &mut self,
        parent: Option<&str>,
        name: &str,
        kind: NodeKind,
    ) -> Result<String, MutationError> {
        let name = self.validate_name(name)?;
        let path = path_utils::join(parent, &name);

        match self.api.create(&self.root, &path, kind).await {
            Ok(()) => {
                tracing::info!("Created {} '{}'", kind, path);
                self.succeed(t!("explorer.created", name = &name).to_string());
                Ok(path)
            }
            Err(e) => Err(self.fail(
                t!("explorer.error_creating", name = &name, error = e.user_message()).to_string(),
                MutationError::Rejected(e),
            )),
        }
    }

    /// Rename the node at `old_path` to `new_name`, keeping it in its parent.
    ///
    /// Dirty tabs for the node (or anything below a folder) are saved first.
    /// On success their keys and the active pointer move to the new path.
    pub async fn rename(
        &mut self,
        tree: &[FileNode],
        old_path: &str,
        new_name: &str,
    ) -> Result<String, MutationError> {
        let old_path = path_utils::normalize(old_path);
        let new_name = self.validate_name(new_name)?;
        self.require_node(tree, &old_path)?;

        let new_path = path_utils::join(Some(&path_utils::parent_of(&old_path)), &new_name);
        if new_path == old_path {
            return Ok(new_path);
        }

        self.flush_dirty_tabs(&old_path).await?;

        match self.api.rename(&self.root, &old_path, &new_path).await {
            Ok(()) => {
                tracing::info!("Renamed '{}' to '{}'", old_path, new_path);
                self.tabs = self.tabs.relabel(&old_path, &new_path);
                self.succeed(
                    t!(
                        "explorer.renamed",
                        old = path_utils::file_name(&old_path),
                        new = &new_name
                    )
                    .to_string(),
                );
                Ok(new_path)
            }
            Err(e) => Err(self.fail(
                t!("explorer.error_renaming", error = e.user_message()).to_string(),
                MutationError::Rejected(e),
            )),
        }
    }

    /// Delete the node at `path`. Tabs at or below it are closed afterwards.
    pub async fn delete(&mut self, tree: &[FileNode], path: &str) -> Result<(), MutationError> {
        let path = path_utils::normalize(path);
        self.require_node(tree, &path)?;

        match self.api.delete(&self.root, &path).await {
            Ok(()) => {
                tracing::info!("Deleted '{}'", path);
                self.tabs = self.tabs.close_within(&path);
                self.succeed(t!("explorer.deleted", name = path_utils::file_name(&path)).to_string());
                Ok(())
            }
            Err(e) => Err(self.fail(
                t!("explorer.error_deleting", error = e.user_message()).to_string(),
                MutationError::Rejected(e),
            )),
        }
    }

    async fn flush_dirty_tabs(&mut self, path: &str) -> Result<(), MutationError> {
        let dirty: Vec<(String, String)> = self
            .tabs
            .dirty_within(path)
            .into_iter()
            .map(|tab| (tab.path.clone(), tab.content.clone()))
            .collect();

        for (tab_path, content) in dirty {
            if let Err(e) = self.api.write_file(&self.root, &tab_path, &content).await {
                return Err(self.fail(
                    t!("explorer.error_saving", name = &tab_path, error = e.user_message())
                        .to_string(),
                    MutationError::SaveFailed {
                        path: tab_path,
                        source: e,
                    },
                ));
            }
            tracing::debug!("Saved '{}' before rename", tab_path);
            self.tabs = self.tabs.mark_saved(&tab_path);
        }
        Ok(())
    }

    fn validate_name(&mut self, name: &str) -> Result<String, MutationError> {
        let name = name.trim();
        let message = if name.is_empty() {
            t!("explorer.name_empty").to_string()
        } else if name.contains(['/', '\\']) || name == "." || name == ".." {
            t!("explorer.name_invalid", name = name).to_string()
        } else {
            return Ok(name.to_string());
        };
        Err(self.fail(message.clone(), MutationError::Validation(message)))
    }

    fn require_node(&mut self, tree: &[FileNode], path: &str) -> Result<(), MutationError> {
        if path.is_empty() {
            let message = t!("explorer.cannot_modify_root").to_string();
            return Err(self.fail(message.clone(), MutationError::Validation(message)));
        }
        if merge::find_node(tree, path).is_none() {
            let message = t!("explorer.not_found", name = path).to_string();
            return Err(self.fail(message.clone(), MutationError::Validation(message)));
        }
        Ok(())
    }

    fn succeed(&mut self, status: String) {
        self.error = None;
        self.status = Some(status);
        if let Some(refresh) = &self.refresh {
            refresh();
        }
    }

    fn fail(&mut self, message: String, error: MutationError) -> MutationError {
        tracing::warn!("{}", error);
        self.error = Some(message);
        error
    }
}
