//! Event loop executing the commands of the active tree sync session.
//!
//! Watch subscriptions run on helper threads and report back over a channel;
//! reconnect timers live in a [`TimerQueue`] measured against a
//! [`TimeSource`](crate::services::time_source::TimeSource). All state
//! changes happen on the thread that owns the driver.

use crate::file_tree::explorer::FileExplorer;
use crate::file_tree::loader::{self, ExpandStart, FetchOutcome, FetchTicket, LoadError};
use crate::file_tree::sync::{AttemptId, SyncCommand, SyncEvent};
use crate::primitives::timers::TimerQueue;
use crate::services::api::FileApi;
use crate::services::time_source::SharedTimeSource;
use crate::services::watch::{WatchConnector, WatchHandle};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// A fetch between `begin_*` and `finish_*`. Dropped unsettled (the caller
/// gave up on the future), it frees the folder for another expand.
struct PendingFetch<'a> {
    explorer: &'a mut FileExplorer,
    ticket: FetchTicket,
    settled: bool,
}

impl<'a> PendingFetch<'a> {
    fn new(explorer: &'a mut FileExplorer, ticket: FetchTicket) -> Self {
        Self {
            explorer,
            ticket,
            settled: false,
        }
    }
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("fetch for {:?} abandoned", self.ticket.path);
            self.explorer.abandon_fetch(&self.ticket);
        }
    }
}

pub struct TreeWatchDriver {
    explorer: FileExplorer,
    connector: Arc<dyn WatchConnector>,
    time: SharedTimeSource,
    timers: TimerQueue,
    transports: HashMap<AttemptId, Box<dyn WatchHandle>>,
    events_tx: Sender<SyncEvent>,
    events_rx: Receiver<SyncEvent>,
    subscriptions_started: u64,
}

impl TreeWatchDriver {
    pub fn new(
        explorer: FileExplorer,
        connector: Arc<dyn WatchConnector>,
        time: SharedTimeSource,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            explorer,
            connector,
            time,
            timers: TimerQueue::new(),
            transports: HashMap::new(),
            events_tx,
            events_rx,
            subscriptions_started: 0,
        }
    }

    pub fn explorer(&self) -> &FileExplorer {
        &self.explorer
    }

    /// Number of subscriptions currently open.
    pub fn open_transports(&self) -> usize {
        self.transports.len()
    }

    /// Number of subscriptions opened since the driver was created.
    pub fn subscriptions_started(&self) -> u64 {
        self.subscriptions_started
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Sender for injecting events, e.g. from a transport owned elsewhere.
    pub fn event_sender(&self) -> Sender<SyncEvent> {
        self.events_tx.clone()
    }

    pub fn open_root(&mut self, root: &str) -> bool {
        let commands = self.explorer.open_root(root, self.time.now());
        self.execute(commands)
    }

    pub fn unmount(&mut self) -> bool {
        let commands = self.explorer.unmount(self.time.now());
        self.execute(commands)
    }

    /// Feed one event to the session and run what it asks for. Returns true
    /// if the tree changed.
    pub fn dispatch(&mut self, event: SyncEvent) -> bool {
        let commands = self.explorer.handle_sync(event, self.time.now());
        self.execute(commands)
    }

    /// Handle every queued event and every due timer without blocking.
    pub fn process_pending(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.dispatch(event);
        }
        changed | self.fire_due_timers()
    }

    /// Wait up to `max_wait` for the next event or timer, then process
    /// everything that is ready.
    pub fn pump(&mut self, max_wait: Duration) -> bool {
        let wait = match self.timers.next_deadline() {
            Some(deadline) => max_wait.min(deadline.saturating_duration_since(self.time.now())),
            None => max_wait,
        };
        let mut changed = false;
        match self.events_rx.recv_timeout(wait) {
            Ok(event) => changed |= self.dispatch(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("watch event channel disconnected");
            }
        }
        changed | self.process_pending()
    }

    /// Expand a folder, fetching its children through `api` if needed.
    pub async fn expand(
        &mut self,
        api: &dyn FileApi,
        path: &str,
    ) -> Result<FetchOutcome, LoadError> {
        let ticket = match self.explorer.begin_expand(path) {
            ExpandStart::Fetch(ticket) => ticket,
            ExpandStart::Expanded => return Ok(FetchOutcome::Applied),
            ExpandStart::InFlight | ExpandStart::NotAFolder => {
                return Ok(FetchOutcome::Dropped)
            }
        };
        let mut pending = PendingFetch::new(&mut self.explorer, ticket);
        let result = loader::fetch(api, &pending.ticket).await;
        pending.settled = true;
        pending.explorer.finish_expand(&pending.ticket, result)
    }

    pub fn collapse(&mut self, path: &str) -> bool {
        self.explorer.collapse(path)
    }

    /// Re-pull the whole tree of the active root.
    pub async fn refresh(&mut self, api: &dyn FileApi) -> Result<FetchOutcome, LoadError> {
        let Some(ticket) = self.explorer.begin_refresh() else {
            return Ok(FetchOutcome::Dropped);
        };
        let mut pending = PendingFetch::new(&mut self.explorer, ticket);
        let result = loader::fetch(api, &pending.ticket).await;
        pending.settled = true;
        pending.explorer.finish_refresh(&pending.ticket, result)
    }

    fn fire_due_timers(&mut self) -> bool {
        let mut changed = false;
        for timer in self.timers.pop_expired(self.time.now()) {
            changed |= self.dispatch(SyncEvent::TimerFired(timer));
        }
        changed
    }

    fn execute(&mut self, commands: Vec<SyncCommand>) -> bool {
        let mut changed = false;
        for command in commands {
            match command {
                SyncCommand::Subscribe { root, attempt } => {
                    let handle = self
                        .connector
                        .subscribe(&root, attempt, self.events_tx.clone());
                    self.transports.insert(attempt, handle);
                    self.subscriptions_started += 1;
                }
                SyncCommand::ScheduleReconnect { timer, delay } => {
                    tracing::debug!("reconnecting in {:?}", delay);
                    self.timers.schedule(timer, self.time.now() + delay);
                }
                SyncCommand::CancelTimer(timer) => {
                    self.timers.cancel(timer);
                }
                SyncCommand::CloseTransport(attempt) => {
                    if let Some(mut handle) = self.transports.remove(&attempt) {
                        handle.close();
                    }
                }
                SyncCommand::TreeChanged => changed = true,
            }
        }
        changed
    }
}

impl Drop for TreeWatchDriver {
    fn drop(&mut self) {
        for (_, mut handle) in self.transports.drain() {
            handle.close();
        }
    }
}
