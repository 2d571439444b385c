//! Tree watch stream (server-sent events).
//!
//! The server keeps `GET /api/watch?root=R` open and writes one event per
//! filesystem change. `event: connected` acknowledges the subscription,
//! `event: error` reports a failure to set up watching, and unnamed events
//! carry a JSON snapshot of the watched tree.

use crate::file_tree::sync::{AttemptId, SyncEvent};
use crate::model::file_node::decode_nodes;
use crate::services::api::ApiError;
use crate::services::http::{api_url, map_ureq_error, parse_base};
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser, fed one line at a time.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). A blank line dispatches the
    /// event accumulated so far.
    pub fn push_line(&mut self, line: &str) -> Option<SseMessage> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}

/// Translate a watch-stream message into a session event.
pub fn to_sync_event(message: SseMessage, attempt: AttemptId) -> Option<SyncEvent> {
    match message.event.as_deref() {
        Some("connected") => Some(SyncEvent::Connected { attempt }),
        Some("error") => Some(SyncEvent::TransportError {
            attempt,
            message: message.data,
        }),
        None | Some("message") => match decode_nodes(&message.data) {
            Ok(nodes) => Some(SyncEvent::SnapshotReceived { attempt, nodes }),
            Err(e) => {
                tracing::warn!("watch: ignoring undecodable snapshot: {}", e);
                None
            }
        },
        Some(other) => {
            tracing::debug!("watch: ignoring event '{}'", other);
            None
        }
    }
}

/// Handle to a running subscription.
pub trait WatchHandle: Send {
    /// Stop delivering events. Must not block.
    fn close(&mut self);
}

/// Opens watch subscriptions. Each subscription reports its events, tagged
/// with `attempt`, on `events`; it ends with exactly one
/// `TransportError` or `TransportClosed` unless closed first.
pub trait WatchConnector: Send + Sync {
    fn subscribe(
        &self,
        root: &str,
        attempt: AttemptId,
        events: Sender<SyncEvent>,
    ) -> Box<dyn WatchHandle>;
}

/// Read timeout of the watch socket. A closed subscription notices within
/// one interval and drops its connection.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// [`WatchConnector`] reading the SSE stream on a helper thread.
#[derive(Debug, Clone)]
pub struct HttpWatchConnector {
    base: url::Url,
    agent: ureq::Agent,
}

impl HttpWatchConnector {
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        Ok(Self {
            base: parse_base(endpoint)?,
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(5))
                .timeout_read(POLL_INTERVAL)
                .build(),
        })
    }
}

struct ThreadWatchHandle {
    closed: Arc<AtomicBool>,
}

impl WatchHandle for ThreadWatchHandle {
    /// The reader thread sees the flag within [`POLL_INTERVAL`] and drops the
    /// connection.
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl WatchConnector for HttpWatchConnector {
    fn subscribe(
        &self,
        root: &str,
        attempt: AttemptId,
        events: Sender<SyncEvent>,
    ) -> Box<dyn WatchHandle> {
        let closed = Arc::new(AtomicBool::new(false));
        let handle = ThreadWatchHandle {
            closed: closed.clone(),
        };
        let url = api_url(&self.base, &["api".into(), "watch".into()], root);
        let agent = self.agent.clone();

        std::thread::spawn(move || {
            let end = match url {
                Ok(url) => read_stream(&agent, &url, attempt, &events, &closed),
                Err(e) => SyncEvent::TransportError {
                    attempt,
                    message: e.to_string(),
                },
            };
            if !closed.load(Ordering::SeqCst) {
                let _ = events.send(end);
            }
        });

        Box::new(handle)
    }
}

/// Pump the stream until it ends; returns the terminating event.
fn read_stream(
    agent: &ureq::Agent,
    url: &url::Url,
    attempt: AttemptId,
    events: &Sender<SyncEvent>,
    closed: &AtomicBool,
) -> SyncEvent {
    tracing::debug!("watch: subscribing {} ({})", url, attempt);
    let response = match agent
        .request_url("GET", url)
        .set("Accept", "text/event-stream")
        .call()
    {
        Ok(response) => response,
        Err(e) => {
            return SyncEvent::TransportError {
                attempt,
                message: map_ureq_error(e).to_string(),
            }
        }
    };

    let mut decoder = SseDecoder::new();
    let mut reader = BufReader::new(response.into_reader());
    let mut line = Vec::new();
    while !closed.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) if line.last() != Some(&b'\n') => continue,
            Ok(_) => {}
            // Bytes read before the timeout stay in `line`.
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => {
                return SyncEvent::TransportError {
                    attempt,
                    message: e.to_string(),
                }
            }
        }
        let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
        line.clear();
        if let Some(event) = decoder
            .push_line(&text)
            .and_then(|message| to_sync_event(message, attempt))
        {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    tracing::debug!("watch: stream for {} ended", attempt);
    SyncEvent::TransportClosed { attempt }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut SseDecoder, text: &str) -> Vec<SseMessage> {
        text.split('\n')
            .filter_map(|line| decoder.push_line(line))
            .collect()
    }

    #[test]
    fn test_decodes_named_and_default_events() {
        let mut decoder = SseDecoder::new();
        let messages = feed(
            &mut decoder,
            "event: connected\ndata: connected\n\ndata: [{\"name\":\"a\",\"type\":\"file\",\"path\":\"/a\"}]\n\n",
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event.as_deref(), Some("connected"));
        assert_eq!(messages[1].event, None);
        assert!(messages[1].data.starts_with('['));
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let messages = feed(&mut decoder, ": keepalive\ndata: one\r\ndata:two\n\n");
        assert_eq!(
            messages,
            vec![SseMessage {
                event: None,
                data: "one\ntwo".into()
            }]
        );
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut decoder = SseDecoder::new();
        assert!(feed(&mut decoder, "event: ping\n\n").is_empty());
        // The dangling event name does not leak into the next message.
        let messages = feed(&mut decoder, "data: x\n\n");
        assert_eq!(messages[0].event, None);
    }

    #[test]
    fn test_to_sync_event_mapping() {
        let attempt = AttemptId(9);
        let connected = SseMessage {
            event: Some("connected".into()),
            data: "connected".into(),
        };
        assert_eq!(
            to_sync_event(connected, attempt),
            Some(SyncEvent::Connected { attempt })
        );

        let error = SseMessage {
            event: Some("error".into()),
            data: "Failed to setup file watching".into(),
        };
        assert!(matches!(
            to_sync_event(error, attempt),
            Some(SyncEvent::TransportError { message, .. }) if message.contains("watching")
        ));

        let snapshot = SseMessage {
            event: None,
            data: r#"[{"name":"src","type":"folder","path":"/src","children":[]}]"#.into(),
        };
        match to_sync_event(snapshot, attempt) {
            Some(SyncEvent::SnapshotReceived { nodes, .. }) => {
                assert_eq!(nodes[0].path, "src");
                assert!(nodes[0].loaded);
            }
            other => panic!("unexpected {:?}", other),
        }

        let garbage = SseMessage {
            event: None,
            data: "{not json".into(),
        };
        assert_eq!(to_sync_event(garbage, attempt), None);
    }
}
