//! The file explorer's tree state.
//!
//! [`FileExplorer`] owns the active [`TreeSyncSession`] together with its
//! [`LazyLoader`] and is the only writer of the tree. Changing the root tears
//! the previous session down before the new one starts, so two roots never
//! feed the same tree.

use crate::file_tree::loader::{
    ExpandStart, FetchOutcome, FetchTicket, LazyLoader, LoadError,
};
use crate::file_tree::merge;
use crate::file_tree::sync::{ConnectionState, SyncCommand, SyncEvent, TreeSyncSession};
use crate::model::FileNode;
use crate::services::api::ApiError;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FileExplorer {
    session: Option<TreeSyncSession>,
    loader: LazyLoader,
    reconnect_delay: Duration,
}

impl FileExplorer {
    pub fn new(page_limit: usize, reconnect_delay: Duration) -> Self {
        Self {
            session: None,
            loader: LazyLoader::new("", page_limit),
            reconnect_delay,
        }
    }

    /// Make `root` the active root. Returns the teardown commands of the
    /// previous session followed by the subscribe command of the new one.
    pub fn open_root(&mut self, root: &str, now: Instant) -> Vec<SyncCommand> {
        let mut commands = self.teardown_session(now);
        self.loader.reset(root);
        let session = TreeSyncSession::new(root, self.reconnect_delay);
        tracing::info!("Opening root '{}'", session.root());
        commands.extend(session.start());
        self.session = Some(session);
        commands
    }

    /// Tear down the active session, leaving the explorer without a root.
    pub fn unmount(&mut self, now: Instant) -> Vec<SyncCommand> {
        let commands = self.teardown_session(now);
        self.loader.reset("");
        commands
    }

    /// Route a transport or timer event to the active session.
    pub fn handle_sync(&mut self, event: SyncEvent, now: Instant) -> Vec<SyncCommand> {
        match self.session.as_mut() {
            Some(session) => session.handle(event, now),
            None => Vec::new(),
        }
    }

    pub fn root(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.root())
    }

    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Closed, |s| s.state())
    }

    pub fn session(&self) -> Option<&TreeSyncSession> {
        self.session.as_ref()
    }

    pub fn tree(&self) -> &[FileNode] {
        self.session.as_ref().map_or(&[][..], |s| s.tree())
    }

    pub fn find(&self, path: &str) -> Option<&FileNode> {
        merge::find_node(self.tree(), path)
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.loader.is_expanded(path)
    }

    pub fn loader(&self) -> &LazyLoader {
        &self.loader
    }

    pub fn begin_expand(&mut self, path: &str) -> ExpandStart {
        if self.session.is_none() {
            return ExpandStart::NotAFolder;
        }
        let tree = self.session.as_ref().map_or(&[][..], |s| s.tree());
        self.loader.begin_expand(tree, path)
    }

    pub fn finish_expand(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Option<Vec<FileNode>>, ApiError>,
    ) -> Result<FetchOutcome, LoadError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(FetchOutcome::Dropped);
        };
        self.loader
            .finish_expand(ticket, result, |path, children, limit| {
                session.apply_subtree(path, children, limit)
            })
    }

    /// Forget a fetch that was started but will not be finished.
    pub fn abandon_fetch(&mut self, ticket: &FetchTicket) {
        self.loader.abandon(ticket);
    }

    pub fn collapse(&mut self, path: &str) -> bool {
        self.loader.collapse(path)
    }

    /// Start a manual full refresh of the active root.
    pub fn begin_refresh(&mut self) -> Option<FetchTicket> {
        self.session.as_ref()?;
        self.loader.begin_refresh()
    }

    pub fn finish_refresh(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Option<Vec<FileNode>>, ApiError>,
    ) -> Result<FetchOutcome, LoadError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(FetchOutcome::Dropped);
        };
        self.loader
            .finish_refresh(ticket, result, |nodes| session.apply_full(nodes))
    }

    fn teardown_session(&mut self, now: Instant) -> Vec<SyncCommand> {
        match self.session.take() {
            Some(mut old) => {
                tracing::info!("Closing root '{}'", old.root());
                old.handle(SyncEvent::Teardown, now)
            }
            None => Vec::new(),
        }
    }
}
