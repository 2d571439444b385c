//! In-memory stand-ins for the network seams.

use async_trait::async_trait;
use lite_ide::file_tree::{AttemptId, SyncEvent};
use lite_ide::model::{FileNode, NodeKind};
use lite_ide::services::api::{ApiError, FileApi};
use lite_ide::services::terminal::{OutboundFrame, TerminalConnector, TerminalId, TerminalLink};
use lite_ide::services::terminal::transport::TerminalEventSender;
use lite_ide::services::terminal::TerminalEvent;
use lite_ide::services::watch::{WatchConnector, WatchHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// One recorded call against [`FakeFileApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListDir(Option<String>),
    ExtendWatch(String),
    Create(String, NodeKind),
    Rename(String, String),
    Delete(String),
    Read(String),
    Write(String, String),
}

/// [`FileApi`] answering from canned listings and recording every call.
#[derive(Default)]
pub struct FakeFileApi {
    pub calls: Mutex<Vec<ApiCall>>,
    listings: Mutex<HashMap<Option<String>, Vec<FileNode>>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    stalled: AtomicBool,
}

impl FakeFileApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `list_dir(path)` with `nodes`.
    pub fn set_listing(&self, path: Option<&str>, nodes: Vec<FileNode>) {
        self.listings
            .lock()
            .unwrap()
            .insert(path.map(str::to_string), nodes);
    }

    /// Make every call of `op` ("list_dir", "create", "rename", "delete",
    /// "write_file", ...) fail with `error`.
    pub fn fail(&self, op: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    /// While set, `list_dir` never completes.
    pub fn stall_listings(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, call: ApiCall) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FileApi for FakeFileApi {
    async fn list_dir(
        &self,
        _root: &str,
        path: Option<&str>,
    ) -> Result<Option<Vec<FileNode>>, ApiError> {
        self.record("list_dir", ApiCall::ListDir(path.map(str::to_string)))?;
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(&path.map(str::to_string))
            .cloned())
    }

    async fn extend_watch(&self, _root: &str, path: &str) -> Result<(), ApiError> {
        self.record("extend_watch", ApiCall::ExtendWatch(path.to_string()))
    }

    async fn create(&self, _root: &str, path: &str, kind: NodeKind) -> Result<(), ApiError> {
        self.record("create", ApiCall::Create(path.to_string(), kind))
    }

    async fn rename(&self, _root: &str, from: &str, to: &str) -> Result<(), ApiError> {
        self.record("rename", ApiCall::Rename(from.to_string(), to.to_string()))
    }

    async fn delete(&self, _root: &str, path: &str) -> Result<(), ApiError> {
        self.record("delete", ApiCall::Delete(path.to_string()))
    }

    async fn read_file(&self, _root: &str, path: &str) -> Result<String, ApiError> {
        self.record("read_file", ApiCall::Read(path.to_string()))?;
        Ok(String::new())
    }

    async fn write_file(&self, _root: &str, path: &str, content: &str) -> Result<(), ApiError> {
        self.record(
            "write_file",
            ApiCall::Write(path.to_string(), content.to_string()),
        )
    }
}

/// Watch connector whose subscriptions fail immediately (or stay silent).
pub struct FakeWatchConnector {
    fail_immediately: bool,
    pub subscribed: AtomicUsize,
    pub open: Arc<AtomicUsize>,
    pub max_open: Arc<AtomicUsize>,
    senders: Mutex<Vec<(AttemptId, Sender<SyncEvent>)>>,
}

impl FakeWatchConnector {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::with_mode(true))
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self::with_mode(false))
    }

    fn with_mode(fail_immediately: bool) -> Self {
        Self {
            fail_immediately,
            subscribed: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn subscriptions(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Push `event` as if the subscription of the latest attempt produced it.
    pub fn emit(&self, make: impl FnOnce(AttemptId) -> SyncEvent) {
        let senders = self.senders.lock().unwrap();
        if let Some((attempt, sender)) = senders.last() {
            let _ = sender.send(make(*attempt));
        }
    }
}

struct FakeWatchHandle {
    closed: bool,
    open: Arc<AtomicUsize>,
}

impl WatchHandle for FakeWatchHandle {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl WatchConnector for FakeWatchConnector {
    fn subscribe(
        &self,
        _root: &str,
        attempt: AttemptId,
        events: Sender<SyncEvent>,
    ) -> Box<dyn WatchHandle> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        if self.fail_immediately {
            let _ = events.send(SyncEvent::TransportError {
                attempt,
                message: "connection refused".into(),
            });
        }
        self.senders.lock().unwrap().push((attempt, events));
        Box::new(FakeWatchHandle {
            closed: false,
            open: self.open.clone(),
        })
    }
}

/// Terminal connector recording every frame, with manual event injection.
#[derive(Default)]
pub struct FakeTerminalConnector {
    pub frames: Arc<Mutex<Vec<(TerminalId, OutboundFrame)>>>,
    pub connects: Mutex<Vec<(TerminalId, AttemptId, TerminalEventSender)>>,
    pub closed: Arc<Mutex<Vec<(TerminalId, AttemptId)>>>,
}

impl FakeTerminalConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames_for(&self, terminal: TerminalId) -> Vec<OutboundFrame> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == terminal)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Report `event` for the latest connection of `terminal`.
    pub fn emit(&self, terminal: TerminalId, make: impl FnOnce(AttemptId) -> TerminalEvent) {
        let connects = self.connects.lock().unwrap();
        if let Some((_, attempt, sender)) = connects.iter().rev().find(|(t, _, _)| *t == terminal) {
            let _ = sender.send((terminal, make(*attempt)));
        }
    }
}

struct FakeLink {
    terminal: TerminalId,
    attempt: AttemptId,
    frames: Arc<Mutex<Vec<(TerminalId, OutboundFrame)>>>,
    closed_log: Arc<Mutex<Vec<(TerminalId, AttemptId)>>>,
    closed: AtomicBool,
}

impl TerminalLink for FakeLink {
    fn send(&mut self, frame: OutboundFrame) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.frames.lock().unwrap().push((self.terminal, frame));
        true
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_log
                .lock()
                .unwrap()
                .push((self.terminal, self.attempt));
        }
    }
}

impl TerminalConnector for FakeTerminalConnector {
    fn connect(
        &self,
        terminal: TerminalId,
        attempt: AttemptId,
        events: TerminalEventSender,
    ) -> Box<dyn TerminalLink> {
        self.connects
            .lock()
            .unwrap()
            .push((terminal, attempt, events));
        Box::new(FakeLink {
            terminal,
            attempt,
            frames: self.frames.clone(),
            closed_log: self.closed.clone(),
            closed: AtomicBool::new(false),
        })
    }
}
