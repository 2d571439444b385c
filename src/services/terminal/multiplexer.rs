//! Terminal tabs.
//!
//! Every tab owns an independent [`TerminalSession`] that stays connected
//! while in the background. One tab is active; activating a tab requests
//! focus for its view, retrying at a fixed delay until the view reports
//! mounted or the retry budget runs out.

use crate::services::terminal::frame::TerminalSize;
use crate::services::terminal::session::{
    SessionOptions, TerminalCommand, TerminalEvent, TerminalId, TerminalSession, TerminalState,
};
use rust_i18n::t;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// At least one terminal tab must remain.
    LastTab,
    UnknownTab(TerminalId),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::LastTab => write!(f, "{}", t!("terminal.cannot_close_last")),
            MuxError::UnknownTab(id) => write!(f, "Unknown terminal: {}", id),
        }
    }
}

impl std::error::Error for MuxError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCommand {
    /// A command from the session of `terminal`.
    Session(TerminalId, TerminalCommand),
    /// Move keyboard focus to the view of `terminal`.
    Focus(TerminalId),
}

#[derive(Debug, Clone)]
pub struct FocusPolicy {
    pub retry_delay: Duration,
    pub max_attempts: u32,
}

impl Default for FocusPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(100),
            max_attempts: 5,
        }
    }
}

#[derive(Debug)]
pub struct TerminalTab {
    pub id: TerminalId,
    pub name: String,
    session: TerminalSession,
}

impl TerminalTab {
    pub fn session(&self) -> &TerminalSession {
        &self.session
    }

    pub fn state(&self) -> TerminalState {
        self.session.state()
    }
}

#[derive(Debug)]
struct PendingFocus {
    terminal: TerminalId,
    attempts: u32,
    next_at: Instant,
}

#[derive(Debug)]
pub struct TerminalMultiplexer {
    tabs: Vec<TerminalTab>,
    active: TerminalId,
    next_id: usize,
    options: SessionOptions,
    focus_policy: FocusPolicy,
    mounted: HashSet<TerminalId>,
    pending_focus: Option<PendingFocus>,
    viewport: TerminalSize,
}

impl TerminalMultiplexer {
    /// Create the multiplexer with its first tab. The returned commands
    /// connect that tab.
    pub fn new(
        options: SessionOptions,
        focus_policy: FocusPolicy,
        now: Instant,
    ) -> (Self, Vec<MuxCommand>) {
        let mut mux = Self {
            tabs: Vec::new(),
            active: TerminalId(0),
            next_id: 1,
            viewport: options.initial_size,
            options,
            focus_policy,
            mounted: HashSet::new(),
            pending_focus: None,
        };
        let (_, commands) = mux.new_tab(now);
        (mux, commands)
    }

    pub fn tabs(&self) -> &[TerminalTab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active(&self) -> TerminalId {
        self.active
    }

    pub fn tab(&self, id: TerminalId) -> Option<&TerminalTab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    /// Open a new tab named `Terminal N` and make it active.
    pub fn new_tab(&mut self, now: Instant) -> (TerminalId, Vec<MuxCommand>) {
        let id = TerminalId(self.next_id);
        self.next_id += 1;
        let options = SessionOptions {
            initial_size: self.viewport,
            ..self.options.clone()
        };
        let mut session = TerminalSession::new(id, options);
        let mut commands = wrap(id, session.start());
        self.tabs.push(TerminalTab {
            id,
            name: t!("terminal.tab_name", n = id.0).to_string(),
            session,
        });
        tracing::info!("Opened {}", id);
        commands.extend(self.activate(id, now).unwrap_or_default());
        (id, commands)
    }

    /// Close `id`, tearing down its session. Closing the active tab
    /// activates the one before it, or the new first tab.
    pub fn close_tab(&mut self, id: TerminalId, now: Instant) -> Result<Vec<MuxCommand>, MuxError> {
        let index = self.index_of(id)?;
        if self.tabs.len() == 1 {
            return Err(MuxError::LastTab);
        }
        let mut tab = self.tabs.remove(index);
        let mut commands = wrap(id, tab.session.handle(TerminalEvent::Teardown, now));
        self.mounted.remove(&id);
        if self.pending_focus.as_ref().is_some_and(|f| f.terminal == id) {
            self.pending_focus = None;
        }
        tracing::info!("Closed {}", id);

        if self.active == id {
            let next = self.tabs[index.saturating_sub(1)].id;
            commands.extend(self.activate(next, now)?);
        }
        Ok(commands)
    }

    /// Bring `id` to the foreground and request focus for it.
    pub fn activate(&mut self, id: TerminalId, now: Instant) -> Result<Vec<MuxCommand>, MuxError> {
        let index = self.index_of(id)?;
        self.active = id;
        let viewport = self.viewport;
        let session = &mut self.tabs[index].session;
        let mut commands = Vec::new();
        if session.size() != viewport {
            commands = wrap(id, session.handle(TerminalEvent::Resize(viewport), now));
        }

        if self.mounted.contains(&id) {
            self.pending_focus = None;
            commands.push(MuxCommand::Focus(id));
        } else {
            self.pending_focus = Some(PendingFocus {
                terminal: id,
                attempts: 0,
                next_at: now + self.focus_policy.retry_delay,
            });
        }
        Ok(commands)
    }

    /// Report whether the view of `id` is mounted.
    pub fn set_mounted(&mut self, id: TerminalId, mounted: bool) -> Vec<MuxCommand> {
        if !mounted {
            self.mounted.remove(&id);
            return Vec::new();
        }
        self.mounted.insert(id);
        match &self.pending_focus {
            Some(focus) if focus.terminal == id => {
                self.pending_focus = None;
                vec![MuxCommand::Focus(id)]
            }
            _ => Vec::new(),
        }
    }

    /// Route an event to the session of `id`. Events for closed tabs are
    /// dropped.
    pub fn handle(&mut self, id: TerminalId, event: TerminalEvent, now: Instant) -> Vec<MuxCommand> {
        match self.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) => wrap(id, tab.session.handle(event, now)),
            None => {
                tracing::debug!("dropping event for closed {}", id);
                Vec::new()
            }
        }
    }

    /// Keystrokes for the active tab.
    pub fn send_keys(&mut self, bytes: Vec<u8>, now: Instant) -> Vec<MuxCommand> {
        self.handle(self.active, TerminalEvent::Keys(bytes), now)
    }

    /// The panel's viewport changed.
    pub fn resize(&mut self, size: TerminalSize, now: Instant) -> Vec<MuxCommand> {
        self.viewport = size;
        self.handle(self.active, TerminalEvent::Resize(size), now)
    }

    /// Run due resize settles, deferred output and focus retries.
    pub fn tick(&mut self, now: Instant) -> Vec<MuxCommand> {
        let mut commands: Vec<MuxCommand> = self
            .tabs
            .iter_mut()
            .flat_map(|tab| wrap(tab.id, tab.session.tick(now)))
            .collect();

        if let Some(focus) = &mut self.pending_focus {
            if now >= focus.next_at {
                if self.mounted.contains(&focus.terminal) {
                    commands.push(MuxCommand::Focus(focus.terminal));
                    self.pending_focus = None;
                } else if focus.attempts + 1 >= self.focus_policy.max_attempts {
                    tracing::debug!("giving up focusing {}: view not mounted", focus.terminal);
                    self.pending_focus = None;
                } else {
                    focus.attempts += 1;
                    focus.next_at = now + self.focus_policy.retry_delay;
                }
            }
        }
        commands
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tabs
            .iter()
            .filter_map(|t| t.session.next_deadline())
            .chain(self.pending_focus.as_ref().map(|f| f.next_at))
            .min()
    }

    /// Tear down every session (unmount).
    pub fn shutdown(&mut self, now: Instant) -> Vec<MuxCommand> {
        self.pending_focus = None;
        self.tabs
            .iter_mut()
            .flat_map(|tab| wrap(tab.id, tab.session.handle(TerminalEvent::Teardown, now)))
            .collect()
    }

    fn index_of(&self, id: TerminalId) -> Result<usize, MuxError> {
        self.tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or(MuxError::UnknownTab(id))
    }
}

fn wrap(id: TerminalId, commands: Vec<TerminalCommand>) -> Vec<MuxCommand> {
    commands
        .into_iter()
        .map(|c| MuxCommand::Session(id, c))
        .collect()
}
