//! WebSocket transport for terminal sessions.
//!
//! Each connection runs on its own thread. The socket is polled with a
//! short read timeout so that outgoing frames queued by the session are
//! written between reads. Everything the socket produces is reported back
//! as a [`TerminalEvent`] tagged with the terminal and attempt it belongs to.

use crate::primitives::timers::AttemptId;
use crate::services::terminal::frame::{InboundPayload, OutboundFrame};
use crate::services::terminal::session::{TerminalEvent, TerminalId};
use std::fmt;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

/// Read timeout between polls of the outgoing queue.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub type TerminalEventSender = Sender<(TerminalId, TerminalEvent)>;

/// Handle to one open (or opening) connection.
pub trait TerminalLink: Send {
    /// Queue a frame for sending. Returns false once the link is gone.
    fn send(&mut self, frame: OutboundFrame) -> bool;

    /// Close the connection. No events are reported after this returns.
    fn close(&mut self);
}

/// Opens connections for terminal sessions.
pub trait TerminalConnector: Send + Sync {
    fn connect(
        &self,
        terminal: TerminalId,
        attempt: AttemptId,
        events: TerminalEventSender,
    ) -> Box<dyn TerminalLink>;
}

/// Connects to the `/terminal` endpoint of the server.
#[derive(Debug, Clone)]
pub struct WsTerminalConnector {
    url: Url,
}

/// A terminal host that cannot be turned into a `ws://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalUrlError {
    Parse(url::ParseError),
    /// TLS (`wss://`, `https://`) or a non-web scheme.
    UnsupportedScheme(String),
}

impl fmt::Display for TerminalUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalUrlError::Parse(e) => write!(f, "Invalid terminal host: {}", e),
            TerminalUrlError::UnsupportedScheme(scheme) => write!(
                f,
                "Unsupported terminal scheme '{}': only ws:// and http:// hosts are supported",
                scheme
            ),
        }
    }
}

impl std::error::Error for TerminalUrlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TerminalUrlError::Parse(e) => Some(e),
            TerminalUrlError::UnsupportedScheme(_) => None,
        }
    }
}

impl From<url::ParseError> for TerminalUrlError {
    fn from(e: url::ParseError) -> Self {
        TerminalUrlError::Parse(e)
    }
}

impl WsTerminalConnector {
    /// `host` is either a bare `host:port` or a `ws://` or `http://` URL.
    pub fn new(host: &str) -> Result<Self, TerminalUrlError> {
        Ok(Self {
            url: terminal_url(host)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Build the terminal endpoint URL for `host`.
///
/// The connection is plain TCP, so TLS hosts are rejected here rather than
/// failing on every connect.
pub fn terminal_url(host: &str) -> Result<Url, TerminalUrlError> {
    let trimmed = host.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("ws://{}", trimmed)
    };
    let mut url = Url::parse(&with_scheme)?;
    match url.scheme() {
        "ws" => {}
        // http and ws are both special schemes, so the switch is accepted
        "http" => {
            let _ = url.set_scheme("ws");
        }
        other => return Err(TerminalUrlError::UnsupportedScheme(other.to_string())),
    }
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("terminal");
    }
    url.set_query(None);
    Ok(url)
}

impl TerminalConnector for WsTerminalConnector {
    fn connect(
        &self,
        terminal: TerminalId,
        attempt: AttemptId,
        events: TerminalEventSender,
    ) -> Box<dyn TerminalLink> {
        let (outgoing_tx, outgoing_rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let url = self.url.clone();
        let thread_closed = closed.clone();

        std::thread::spawn(move || {
            let reporter = Reporter {
                terminal,
                attempt,
                events,
                closed: thread_closed,
            };
            run_connection(url, outgoing_rx, &reporter);
        });

        Box::new(WsLink {
            outgoing: outgoing_tx,
            closed,
        })
    }
}

struct WsLink {
    outgoing: Sender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl TerminalLink for WsLink {
    fn send(&mut self, frame: OutboundFrame) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.outgoing.send(frame).is_ok()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.close();
    }
}

struct Reporter {
    terminal: TerminalId,
    attempt: AttemptId,
    events: TerminalEventSender,
    closed: Arc<AtomicBool>,
}

impl Reporter {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn report(&self, event: TerminalEvent) {
        if !self.is_closed() {
            let _ = self.events.send((self.terminal, event));
        }
    }

    fn error(&self, message: String) {
        self.report(TerminalEvent::Error {
            attempt: self.attempt,
            message,
        });
    }
}

fn run_connection(url: Url, outgoing: Receiver<OutboundFrame>, reporter: &Reporter) {
    tracing::debug!("{}: connecting to {}", reporter.terminal, url);
    let mut socket = match tungstenite::connect(url.as_str()) {
        Ok((socket, _response)) => socket,
        Err(e) => {
            reporter.error(e.to_string());
            return;
        }
    };
    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        if let Err(e) = stream.set_read_timeout(Some(POLL_INTERVAL)) {
            tracing::warn!("{}: failed to set read timeout: {}", reporter.terminal, e);
        }
    }
    reporter.report(TerminalEvent::Opened {
        attempt: reporter.attempt,
    });

    match pump_socket(&mut socket, &outgoing, reporter) {
        Ok(()) => {}
        Err(message) => reporter.error(message),
    }
    let _ = socket.close(None);
    let _ = socket.flush();
}

/// Shuttle frames until the server closes, the link is closed, or an error
/// occurs. `Ok` means a clean end.
fn pump_socket(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    outgoing: &Receiver<OutboundFrame>,
    reporter: &Reporter,
) -> Result<(), String> {
    loop {
        if reporter.is_closed() {
            return Ok(());
        }

        loop {
            match outgoing.try_recv() {
                Ok(frame) => {
                    let message = match frame {
                        OutboundFrame::Keys(bytes) => Message::binary(bytes),
                        OutboundFrame::Control(control) => Message::text(control.to_json()),
                    };
                    socket.send(message).map_err(|e| e.to_string())?;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        match socket.read() {
            Ok(Message::Binary(bytes)) => reporter.report(TerminalEvent::Payload {
                attempt: reporter.attempt,
                payload: InboundPayload::Binary(bytes.to_vec()),
            }),
            Ok(Message::Text(text)) => reporter.report(TerminalEvent::Payload {
                attempt: reporter.attempt,
                payload: InboundPayload::Text(text.as_str().to_owned()),
            }),
            Ok(Message::Close(_)) => {
                reporter.report(TerminalEvent::Closed {
                    attempt: reporter.attempt,
                });
                return Ok(());
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                reporter.report(TerminalEvent::Closed {
                    attempt: reporter.attempt,
                });
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}
