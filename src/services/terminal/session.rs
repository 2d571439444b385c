//! One terminal's connection state machine.
//!
//! [`TerminalSession`] performs no I/O: the owner feeds it
//! [`TerminalEvent`]s and carries out the returned [`TerminalCommand`]s. The
//! first frame sent on every connection is a resize with the current
//! viewport, followed by keystrokes typed while connecting, in order. Once
//! open, keystrokes are forwarded immediately; resizes go through a
//! [`Coalescer`] and are sent only when the settled size changed.

use crate::primitives::timers::{bounded_reconnect_delay, AttemptId, TimerId};
use crate::primitives::Coalescer;
use crate::services::terminal::frame::{
    ControlMessage, InboundPayload, OutboundFrame, OutputDecoder, TerminalSize,
};
use rust_i18n::t;
use std::fmt;
use std::time::{Duration, Instant};

/// Default quiet period for viewport resize bursts.
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Identifier of a terminal session (one per tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalId(pub usize);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Terminal-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub initial_size: TerminalSize,
    pub resize_debounce: Duration,
    /// Re-enter `Connecting` after the connection drops instead of closing.
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            initial_size: TerminalSize::default(),
            resize_debounce: DEFAULT_RESIZE_DEBOUNCE,
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug)]
pub enum TerminalEvent {
    /// The transport for `attempt` finished its handshake.
    Opened { attempt: AttemptId },
    Payload {
        attempt: AttemptId,
        payload: InboundPayload,
    },
    Closed { attempt: AttemptId },
    Error { attempt: AttemptId, message: String },
    /// Input bytes from the user.
    Keys(Vec<u8>),
    /// The viewport was resized (possibly one of a burst).
    Resize(TerminalSize),
    TimerFired(TimerId),
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Connect { attempt: AttemptId },
    Send {
        attempt: AttemptId,
        frame: OutboundFrame,
    },
    /// Release the transport of `attempt`.
    Close { attempt: AttemptId },
    ScheduleReconnect { timer: TimerId, delay: Duration },
    CancelTimer(TimerId),
    /// Text for the output sink.
    Output(String),
}

#[derive(Debug)]
pub struct TerminalSession {
    id: TerminalId,
    state: TerminalState,
    attempt: AttemptId,
    transport_live: bool,
    pending_frames: Vec<Vec<u8>>,
    size: TerminalSize,
    last_sent_size: Option<TerminalSize>,
    resize: Coalescer<TerminalSize>,
    decoder: OutputDecoder,
    pending_timer: Option<TimerId>,
    auto_reconnect: bool,
    reconnect_delay: Duration,
}

impl TerminalSession {
    pub fn new(id: TerminalId, options: SessionOptions) -> Self {
        Self {
            id,
            state: TerminalState::Connecting,
            attempt: AttemptId::next(),
            transport_live: false,
            pending_frames: Vec::new(),
            size: options.initial_size,
            last_sent_size: None,
            resize: Coalescer::new(options.resize_debounce),
            decoder: OutputDecoder::new(),
            pending_timer: None,
            auto_reconnect: options.auto_reconnect,
            reconnect_delay: bounded_reconnect_delay(options.reconnect_delay),
        }
    }

    /// Commands that open the first connection.
    pub fn start(&mut self) -> Vec<TerminalCommand> {
        if self.state != TerminalState::Connecting || self.transport_live {
            return Vec::new();
        }
        self.transport_live = true;
        vec![TerminalCommand::Connect {
            attempt: self.attempt,
        }]
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn state(&self) -> TerminalState {
        self.state
    }

    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn size(&self) -> TerminalSize {
        self.size
    }

    pub fn pending_frames(&self) -> &[Vec<u8>] {
        &self.pending_frames
    }

    /// Earliest instant at which [`TerminalSession::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.resize.deadline()
    }

    pub fn handle(&mut self, event: TerminalEvent, now: Instant) -> Vec<TerminalCommand> {
        if self.state == TerminalState::Closed {
            return Vec::new();
        }

        match event {
            TerminalEvent::Teardown => self.teardown(),

            TerminalEvent::Keys(bytes) => self.send_keys(bytes),

            TerminalEvent::Resize(size) => {
                self.resize.push(size, now);
                Vec::new()
            }

            TerminalEvent::TimerFired(timer) => {
                if self.pending_timer != Some(timer) {
                    return Vec::new();
                }
                self.pending_timer = None;
                self.attempt = AttemptId::next();
                tracing::debug!("{}: reconnecting ({})", self.id, self.attempt);
                self.start()
            }

            TerminalEvent::Opened { attempt } => {
                if !self.accepts(attempt) || self.state != TerminalState::Connecting {
                    return Vec::new();
                }
                self.on_open()
            }

            TerminalEvent::Payload { attempt, payload } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                self.decoder.push(payload);
                self.output()
            }

            TerminalEvent::Closed { attempt } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                tracing::info!("{}: connection closed", self.id);
                self.on_disconnect(t!("terminal.connection_closed").to_string())
            }

            TerminalEvent::Error { attempt, message } => {
                if !self.accepts(attempt) {
                    return Vec::new();
                }
                tracing::warn!("{}: connection error: {}", self.id, message);
                self.on_disconnect(t!("terminal.connection_error").to_string())
            }
        }
    }

    /// Settle debounced resizes and pick up resolved deferred output.
    pub fn tick(&mut self, now: Instant) -> Vec<TerminalCommand> {
        if self.state == TerminalState::Closed {
            return Vec::new();
        }
        let mut commands = self.output();
        if let Some(size) = self.resize.poll(now) {
            self.size = size;
            if self.state == TerminalState::Open && self.last_sent_size != Some(size) {
                commands.push(self.send_resize(size));
            }
        }
        commands
    }

    fn accepts(&self, attempt: AttemptId) -> bool {
        if attempt != self.attempt || !self.transport_live {
            tracing::debug!("{}: dropping event from {}", self.id, attempt);
            return false;
        }
        true
    }

    fn send_keys(&mut self, bytes: Vec<u8>) -> Vec<TerminalCommand> {
        if bytes.is_empty() {
            return Vec::new();
        }
        match self.state {
            TerminalState::Open => vec![TerminalCommand::Send {
                attempt: self.attempt,
                frame: OutboundFrame::Keys(bytes),
            }],
            TerminalState::Connecting => {
                self.pending_frames.push(bytes);
                Vec::new()
            }
            TerminalState::Closed => Vec::new(),
        }
    }

    fn on_open(&mut self) -> Vec<TerminalCommand> {
        self.state = TerminalState::Open;
        if let Some(latest) = self.resize.take_latest() {
            self.size = latest;
        }
        tracing::info!("{}: connected at {}x{}", self.id, self.size.cols, self.size.rows);

        let attempt = self.attempt;
        let mut commands = vec![self.send_resize(self.size)];
        commands.extend(self.pending_frames.drain(..).map(|bytes| TerminalCommand::Send {
            attempt,
            frame: OutboundFrame::Keys(bytes),
        }));
        commands
    }

    fn send_resize(&mut self, size: TerminalSize) -> TerminalCommand {
        self.last_sent_size = Some(size);
        TerminalCommand::Send {
            attempt: self.attempt,
            frame: OutboundFrame::Control(ControlMessage::resize(size)),
        }
    }

    fn output(&mut self) -> Vec<TerminalCommand> {
        let text = self.decoder.drain();
        if text.is_empty() {
            Vec::new()
        } else {
            vec![TerminalCommand::Output(text)]
        }
    }

    fn on_disconnect(&mut self, notice: String) -> Vec<TerminalCommand> {
        self.transport_live = false;
        let mut commands = vec![TerminalCommand::Close {
            attempt: self.attempt,
        }];
        let mut text = self.decoder.finish();
        text.push_str(&notice);
        commands.push(TerminalCommand::Output(text));
        self.last_sent_size = None;

        if self.auto_reconnect {
            let timer = TimerId::next();
            self.state = TerminalState::Connecting;
            self.pending_timer = Some(timer);
            commands.push(TerminalCommand::ScheduleReconnect {
                timer,
                delay: self.reconnect_delay,
            });
        } else {
            self.state = TerminalState::Closed;
            self.pending_frames.clear();
        }
        commands
    }

    fn teardown(&mut self) -> Vec<TerminalCommand> {
        let mut commands = Vec::new();
        if self.transport_live {
            commands.push(TerminalCommand::Close {
                attempt: self.attempt,
            });
            self.transport_live = false;
        }
        if let Some(timer) = self.pending_timer.take() {
            commands.push(TerminalCommand::CancelTimer(timer));
        }
        self.state = TerminalState::Closed;
        self.pending_frames.clear();
        self.resize.clear();
        tracing::debug!("{}: torn down", self.id);
        commands
    }
}
