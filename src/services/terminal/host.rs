//! Event loop executing the commands of every terminal tab.
//!
//! Connections report back over one channel tagged with the terminal they
//! belong to. Reconnect timers live in a [`TimerQueue`]; resize settles and
//! focus retries are deadlines of the multiplexer itself. Output is buffered
//! per terminal until the caller takes it.

use crate::primitives::timers::{AttemptId, TimerId, TimerQueue};
use crate::services::terminal::frame::TerminalSize;
use crate::services::terminal::multiplexer::{MuxCommand, MuxError, TerminalMultiplexer};
use crate::services::terminal::session::{TerminalCommand, TerminalEvent, TerminalId};
use crate::services::terminal::transport::{TerminalConnector, TerminalLink};
use crate::services::time_source::SharedTimeSource;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

pub struct TerminalHost {
    mux: TerminalMultiplexer,
    connector: Arc<dyn TerminalConnector>,
    time: SharedTimeSource,
    timers: TimerQueue,
    timer_owners: HashMap<TimerId, TerminalId>,
    links: HashMap<(TerminalId, AttemptId), Box<dyn TerminalLink>>,
    events_tx: Sender<(TerminalId, TerminalEvent)>,
    events_rx: Receiver<(TerminalId, TerminalEvent)>,
    output: Vec<(TerminalId, String)>,
    focused: Option<TerminalId>,
    connections_started: u64,
}

impl TerminalHost {
    /// Wrap `mux`, executing `initial` (the commands returned when the
    /// multiplexer was created).
    pub fn new(
        mux: TerminalMultiplexer,
        initial: Vec<MuxCommand>,
        connector: Arc<dyn TerminalConnector>,
        time: SharedTimeSource,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let mut host = Self {
            mux,
            connector,
            time,
            timers: TimerQueue::new(),
            timer_owners: HashMap::new(),
            links: HashMap::new(),
            events_tx,
            events_rx,
            output: Vec::new(),
            focused: None,
            connections_started: 0,
        };
        host.execute(initial);
        host
    }

    pub fn multiplexer(&self) -> &TerminalMultiplexer {
        &self.mux
    }

    pub fn open_links(&self) -> usize {
        self.links.len()
    }

    pub fn connections_started(&self) -> u64 {
        self.connections_started
    }

    /// Terminal whose view last received focus.
    pub fn focused(&self) -> Option<TerminalId> {
        self.focused
    }

    /// Sender for injecting events, e.g. from a transport owned elsewhere.
    pub fn event_sender(&self) -> Sender<(TerminalId, TerminalEvent)> {
        self.events_tx.clone()
    }

    /// Take the output produced since the last call, in order.
    pub fn take_output(&mut self) -> Vec<(TerminalId, String)> {
        std::mem::take(&mut self.output)
    }

    pub fn new_tab(&mut self) -> TerminalId {
        let (id, commands) = self.mux.new_tab(self.time.now());
        self.execute(commands);
        id
    }

    pub fn close_tab(&mut self, id: TerminalId) -> Result<(), MuxError> {
        let commands = self.mux.close_tab(id, self.time.now())?;
        self.execute(commands);
        Ok(())
    }

    pub fn activate(&mut self, id: TerminalId) -> Result<(), MuxError> {
        let commands = self.mux.activate(id, self.time.now())?;
        self.execute(commands);
        Ok(())
    }

    pub fn set_mounted(&mut self, id: TerminalId, mounted: bool) {
        let commands = self.mux.set_mounted(id, mounted);
        self.execute(commands);
    }

    pub fn send_keys(&mut self, bytes: Vec<u8>) {
        let commands = self.mux.send_keys(bytes, self.time.now());
        self.execute(commands);
    }

    pub fn resize(&mut self, size: TerminalSize) {
        let commands = self.mux.resize(size, self.time.now());
        self.execute(commands);
    }

    pub fn dispatch(&mut self, terminal: TerminalId, event: TerminalEvent) {
        let commands = self.mux.handle(terminal, event, self.time.now());
        self.execute(commands);
    }

    /// Handle queued events and every due deadline without blocking.
    pub fn process_pending(&mut self) {
        while let Ok((terminal, event)) = self.events_rx.try_recv() {
            self.dispatch(terminal, event);
        }
        let now = self.time.now();
        for timer in self.timers.pop_expired(now) {
            if let Some(terminal) = self.timer_owners.remove(&timer) {
                self.dispatch(terminal, TerminalEvent::TimerFired(timer));
            }
        }
        let commands = self.mux.tick(now);
        self.execute(commands);
    }

    /// Wait up to `max_wait` for the next event or deadline, then process
    /// everything that is ready.
    pub fn pump(&mut self, max_wait: Duration) {
        let now = self.time.now();
        let deadline = match (self.timers.next_deadline(), self.mux.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let wait = match deadline {
            Some(deadline) => max_wait.min(deadline.saturating_duration_since(now)),
            None => max_wait,
        };
        match self.events_rx.recv_timeout(wait) {
            Ok((terminal, event)) => self.dispatch(terminal, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("terminal event channel disconnected");
            }
        }
        self.process_pending();
    }

    /// Tear down every terminal.
    pub fn shutdown(&mut self) {
        let commands = self.mux.shutdown(self.time.now());
        self.execute(commands);
    }

    fn execute(&mut self, commands: Vec<MuxCommand>) {
        for command in commands {
            match command {
                MuxCommand::Focus(id) => self.focused = Some(id),
                MuxCommand::Session(id, command) => self.execute_session(id, command),
            }
        }
    }

    fn execute_session(&mut self, terminal: TerminalId, command: TerminalCommand) {
        match command {
            TerminalCommand::Connect { attempt } => {
                let link = self
                    .connector
                    .connect(terminal, attempt, self.events_tx.clone());
                self.links.insert((terminal, attempt), link);
                self.connections_started += 1;
            }
            TerminalCommand::Send { attempt, frame } => {
                match self.links.get_mut(&(terminal, attempt)) {
                    Some(link) => {
                        if !link.send(frame) {
                            tracing::debug!("{}: link gone, frame dropped", terminal);
                        }
                    }
                    None => tracing::debug!("{}: no link for {}", terminal, attempt),
                }
            }
            TerminalCommand::Close { attempt } => {
                if let Some(mut link) = self.links.remove(&(terminal, attempt)) {
                    link.close();
                }
            }
            TerminalCommand::ScheduleReconnect { timer, delay } => {
                tracing::debug!("{}: reconnecting in {:?}", terminal, delay);
                self.timers.schedule(timer, self.time.now() + delay);
                self.timer_owners.insert(timer, terminal);
            }
            TerminalCommand::CancelTimer(timer) => {
                self.timers.cancel(timer);
                self.timer_owners.remove(&timer);
            }
            TerminalCommand::Output(text) => self.output.push((terminal, text)),
        }
    }
}

impl Drop for TerminalHost {
    fn drop(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.close();
        }
    }
}
