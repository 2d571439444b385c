//! On-demand loading of folder children.
//!
//! Loading is split into a synchronous `begin_*` step that decides whether a
//! fetch is needed and hands out a [`FetchTicket`], the fetch itself (see
//! [`fetch`]), and a synchronous `finish_*` step that accepts or drops the
//! result. A ticket records the generation it was issued under; switching the
//! root bumps the generation, so results for an abandoned root are dropped.

use crate::file_tree::merge;
use crate::model::FileNode;
use crate::primitives::path_utils;
use crate::services::api::{ApiError, FileApi};
use std::collections::HashSet;
use std::fmt;

/// Proof that a fetch was started, carried back with its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub root: String,
    /// Folder being expanded, or `None` for a full refresh.
    pub path: Option<String>,
}

/// What `begin_expand` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandStart {
    /// Children must be fetched with this ticket.
    Fetch(FetchTicket),
    /// Children are already materialized; the folder is now expanded.
    Expanded,
    /// A fetch for this folder is already running.
    InFlight,
    /// No folder at this path.
    NotAFolder,
}

/// Result of handing a fetch result back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The listing was merged into the tree.
    Applied,
    /// The ticket belongs to an abandoned root; nothing changed.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Fetch { path: String, source: ApiError },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Fetch { path, source } if path.is_empty() => {
                write!(f, "Failed to load tree: {}", source)
            }
            LoadError::Fetch { path, source } => {
                write!(f, "Failed to load '{}': {}", path, source)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Fetch { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub struct LazyLoader {
    root: String,
    generation: u64,
    page_limit: usize,
    expanded: HashSet<String>,
    in_flight: HashSet<String>,
    refresh_in_flight: bool,
}

impl LazyLoader {
    pub fn new(root: &str, page_limit: usize) -> Self {
        Self {
            root: path_utils::normalize_root(root),
            generation: 0,
            page_limit: page_limit.max(1),
            expanded: HashSet::new(),
            in_flight: HashSet::new(),
            refresh_in_flight: false,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    /// Release the fetch slot of a ticket whose result will never be handed
    /// back.
    pub fn abandon(&mut self, ticket: &FetchTicket) {
        if !self.is_current(ticket) {
            return;
        }
        match &ticket.path {
            Some(path) => {
                self.in_flight.remove(path);
            }
            None => self.refresh_in_flight = false,
        }
    }

    /// Switch to a new root. Outstanding tickets become stale.
    pub fn reset(&mut self, root: &str) {
        self.root = path_utils::normalize_root(root);
        self.generation += 1;
        self.expanded.clear();
        self.in_flight.clear();
        self.refresh_in_flight = false;
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(&path_utils::normalize(path))
    }

    pub fn is_in_flight(&self, path: &str) -> bool {
        self.in_flight.contains(&path_utils::normalize(path))
    }

    /// Expanded folders, sorted.
    pub fn expanded_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.expanded.iter().cloned().collect();
        paths.sort();
        paths
    }

    pub fn begin_expand(&mut self, tree: &[FileNode], path: &str) -> ExpandStart {
        let path = path_utils::normalize(path);
        let Some(node) = merge::find_node(tree, &path) else {
            return ExpandStart::NotAFolder;
        };
        if !node.is_folder() {
            return ExpandStart::NotAFolder;
        }
        // A preview listing with `has_more` still needs the full listing.
        if node.loaded && node.children.is_some() && !node.has_more {
            self.expanded.insert(path);
            return ExpandStart::Expanded;
        }
        if !self.in_flight.insert(path.clone()) {
            tracing::debug!("expand: fetch for '{}' already in flight", path);
            return ExpandStart::InFlight;
        }
        ExpandStart::Fetch(self.ticket(Some(path)))
    }

    /// Accept the result of an expand fetch.
    ///
    /// On success the listing is merged through `apply` (an empty or absent
    /// listing is an empty folder). On failure the folder stays collapsed and
    /// its `loaded` flag is left alone.
    pub fn finish_expand(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Option<Vec<FileNode>>, ApiError>,
        apply: impl FnOnce(&str, Vec<FileNode>, usize),
    ) -> Result<FetchOutcome, LoadError> {
        let path = ticket.path.clone().unwrap_or_default();
        if !self.is_current(ticket) {
            tracing::debug!(
                "expand: dropping stale result for '{}' (root '{}', generation {})",
                path,
                ticket.root,
                ticket.generation
            );
            return Ok(FetchOutcome::Dropped);
        }
        self.in_flight.remove(&path);
        match result {
            Ok(children) => {
                apply(&path, children.unwrap_or_default(), self.page_limit);
                self.expanded.insert(path);
                Ok(FetchOutcome::Applied)
            }
            Err(source) => {
                tracing::warn!("expand: failed to load '{}': {}", path, source);
                Err(LoadError::Fetch { path, source })
            }
        }
    }

    /// Only toggles visibility; loaded children are kept.
    pub fn collapse(&mut self, path: &str) -> bool {
        self.expanded.remove(&path_utils::normalize(path))
    }

    /// Start a full-tree refresh. Returns `None` while one is already running.
    pub fn begin_refresh(&mut self) -> Option<FetchTicket> {
        if self.refresh_in_flight {
            return None;
        }
        self.refresh_in_flight = true;
        Some(self.ticket(None))
    }

    pub fn finish_refresh(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Option<Vec<FileNode>>, ApiError>,
        apply: impl FnOnce(Vec<FileNode>),
    ) -> Result<FetchOutcome, LoadError> {
        if !self.is_current(ticket) {
            tracing::debug!("refresh: dropping stale result for root '{}'", ticket.root);
            return Ok(FetchOutcome::Dropped);
        }
        self.refresh_in_flight = false;
        match result {
            Ok(nodes) => {
                apply(nodes.unwrap_or_default());
                Ok(FetchOutcome::Applied)
            }
            Err(source) => {
                tracing::warn!("refresh: failed to load '{}': {}", ticket.root, source);
                Err(LoadError::Fetch {
                    path: String::new(),
                    source,
                })
            }
        }
    }

    fn ticket(&self, path: Option<String>) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
            root: self.root.clone(),
            path,
        }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation && ticket.root == self.root
    }
}

/// Run the fetch for `ticket` against `api`.
///
/// Expanding a folder also asks the server to watch it; that request is
/// best-effort and its failure is only logged.
pub async fn fetch(
    api: &dyn FileApi,
    ticket: &FetchTicket,
) -> Result<Option<Vec<FileNode>>, ApiError> {
    if let Some(path) = &ticket.path {
        if let Err(e) = api.extend_watch(&ticket.root, path).await {
            tracing::warn!("Failed to extend watch to '{}': {}", path, e);
        }
    }
    api.list_dir(&ticket.root, ticket.path.as_deref()).await
}
