//! Live subscription to server-pushed tree snapshots for one root.
//!
//! [`TreeSyncSession`] performs no I/O. The owner feeds it [`SyncEvent`]s and
//! executes the [`SyncCommand`]s it returns. Every subscription attempt gets a
//! fresh [`AttemptId`]; events tagged with an older attempt are dropped, so a
//! transport that was replaced or closed can never touch the tree.

use crate::file_tree::merge;
use crate::model::FileNode;
use crate::primitives::path_utils;
pub use crate::primitives::timers::AttemptId;
use crate::primitives::timers::{bounded_reconnect_delay, TimerId};
use std::time::{Duration, Instant};

/// Default delay before re-subscribing after a transport failure.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Backoff,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The server acknowledged the subscription.
    Connected { attempt: AttemptId },
    SnapshotReceived {
        attempt: AttemptId,
        nodes: Vec<FileNode>,
    },
    TransportError { attempt: AttemptId, message: String },
    TransportClosed { attempt: AttemptId },
    TimerFired(TimerId),
    /// Root change or unmount.
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    Subscribe { root: String, attempt: AttemptId },
    ScheduleReconnect { timer: TimerId, delay: Duration },
    CancelTimer(TimerId),
    CloseTransport(AttemptId),
    /// The tree was replaced and views should re-render.
    TreeChanged,
}

#[derive(Debug)]
pub struct TreeSyncSession {
    root: String,
    state: ConnectionState,
    attempt: AttemptId,
    pending_timer: Option<TimerId>,
    reconnect_delay: Duration,
    tree: Vec<FileNode>,
    last_snapshot_at: Option<Instant>,
    snapshots_applied: u64,
}

impl TreeSyncSession {
    /// Create a session in `Connecting`. Call [`TreeSyncSession::start`] to
    /// obtain the initial subscribe command.
    pub fn new(root: &str, reconnect_delay: Duration) -> Self {
        Self {
            root: path_utils::normalize_root(root),
            state: ConnectionState::Connecting,
            attempt: AttemptId::next(),
            pending_timer: None,
            reconnect_delay: bounded_reconnect_delay(reconnect_delay),
            tree: Vec::new(),
            last_snapshot_at: None,
            snapshots_applied: 0,
        }
    }

    pub fn start(&self) -> Vec<SyncCommand> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        vec![SyncCommand::Subscribe {
            root: self.root.clone(),
            attempt: self.attempt,
        }]
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn tree(&self) -> &[FileNode] {
        &self.tree
    }

    pub fn last_snapshot_at(&self) -> Option<Instant> {
        self.last_snapshot_at
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied
    }

    /// The single transition function.
    pub fn handle(&mut self, event: SyncEvent, now: Instant) -> Vec<SyncCommand> {
        use ConnectionState::*;

        if self.state == Closed {
            return Vec::new();
        }

        match event {
            SyncEvent::Teardown => self.teardown(),

            SyncEvent::TimerFired(timer) => {
                if self.state != Backoff || self.pending_timer != Some(timer) {
                    tracing::debug!("tree sync [{}]: ignoring {}", self.root, timer);
                    return Vec::new();
                }
                self.pending_timer = None;
                self.attempt = AttemptId::next();
                self.state = Connecting;
                tracing::debug!("tree sync [{}]: reconnecting ({})", self.root, self.attempt);
                self.start()
            }

            SyncEvent::Connected { attempt } => {
                if self.accepts(attempt) {
                    tracing::debug!("tree sync [{}]: subscription acknowledged", self.root);
                }
                Vec::new()
            }

            SyncEvent::SnapshotReceived { attempt, nodes } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                if self.state == Connecting {
                    tracing::debug!("tree sync [{}]: open", self.root);
                }
                self.state = Open;
                self.apply_snapshot(nodes, now);
                vec![SyncCommand::TreeChanged]
            }

            SyncEvent::TransportError { attempt, message } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                tracing::warn!("tree sync [{}]: transport error: {}", self.root, message);
                self.enter_backoff()
            }

            SyncEvent::TransportClosed { attempt } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                tracing::warn!("tree sync [{}]: transport closed", self.root);
                self.enter_backoff()
            }
        }
    }

    /// Merge a lazily fetched folder listing into the tree.
    pub fn apply_subtree(&mut self, path: &str, children: Vec<FileNode>, page_limit: usize) {
        let tree = std::mem::take(&mut self.tree);
        self.tree = merge::replace_subtree(tree, path, children, page_limit);
    }

    /// Replace the tree with a pulled full listing (manual refresh).
    pub fn apply_full(&mut self, nodes: Vec<FileNode>) {
        let tree = std::mem::take(&mut self.tree);
        self.tree = merge::replace_all(tree, nodes);
    }

    fn accepts(&self, attempt: AttemptId) -> bool {
        let live = matches!(self.state, ConnectionState::Connecting | ConnectionState::Open);
        if !live || attempt != self.attempt {
            tracing::debug!(
                "tree sync [{}]: dropping event from {} (current {}, {:?})",
                self.root,
                attempt,
                self.attempt,
                self.state
            );
            return false;
        }
        true
    }

    fn apply_snapshot(&mut self, nodes: Vec<FileNode>, now: Instant) {
        let tree = std::mem::take(&mut self.tree);
        self.tree = merge::replace_all(tree, nodes);
        self.last_snapshot_at = Some(now);
        self.snapshots_applied += 1;
    }

    fn enter_backoff(&mut self) -> Vec<SyncCommand> {
        let timer = TimerId::next();
        self.state = ConnectionState::Backoff;
        self.pending_timer = Some(timer);
        vec![
            SyncCommand::CloseTransport(self.attempt),
            SyncCommand::ScheduleReconnect {
                timer,
                delay: self.reconnect_delay,
            },
        ]
    }

    fn teardown(&mut self) -> Vec<SyncCommand> {
        let mut commands = Vec::new();
        if let Some(timer) = self.pending_timer.take() {
            commands.push(SyncCommand::CancelTimer(timer));
        }
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            commands.push(SyncCommand::CloseTransport(self.attempt));
        }
        tracing::debug!("tree sync [{}]: closed", self.root);
        self.state = ConnectionState::Closed;
        commands
    }
}
