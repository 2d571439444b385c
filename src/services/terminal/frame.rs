//! Terminal wire frames.
//!
//! Client to server, keystrokes travel as binary frames and control messages
//! as text frames holding JSON, so the server can always tell them apart.
//! Server to client, output may arrive as binary, text, or a deferred binary
//! payload; [`OutputDecoder`] turns all three into one ordered UTF-8 stream.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Structured message sent alongside the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Resize { cols: u16, rows: u16 },
}

impl ControlMessage {
    pub fn resize(size: TerminalSize) -> Self {
        ControlMessage::Resize {
            cols: size.cols,
            rows: size.rows,
        }
    }

    pub fn to_json(&self) -> String {
        // two integers under a string tag; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// A frame the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Raw input bytes, sent as a binary frame.
    Keys(Vec<u8>),
    /// Control message, sent as a text frame.
    Control(ControlMessage),
}

impl OutboundFrame {
    pub fn is_control(&self) -> bool {
        matches!(self, OutboundFrame::Control(_))
    }
}

/// An output payload received from the server.
#[derive(Debug)]
pub enum InboundPayload {
    Binary(Vec<u8>),
    Text(String),
    /// Bytes that become available later. Payloads behind it wait for it.
    Deferred(oneshot::Receiver<Vec<u8>>),
}

/// Ordered output normalizer.
#[derive(Debug, Default)]
pub struct OutputDecoder {
    queue: VecDeque<InboundPayload>,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    carry: Vec<u8>,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: InboundPayload) {
        self.queue.push_back(payload);
    }

    /// True while a deferred payload blocks the queue.
    pub fn is_blocked(&self) -> bool {
        matches!(self.queue.front(), Some(InboundPayload::Deferred(_)))
    }

    /// Decode every payload that is ready, in arrival order, stopping at the
    /// first deferred payload that has not resolved yet.
    pub fn drain(&mut self) -> String {
        let mut out = String::new();
        while let Some(payload) = self.queue.pop_front() {
            let bytes = match payload {
                InboundPayload::Binary(bytes) => bytes,
                InboundPayload::Text(text) => text.into_bytes(),
                InboundPayload::Deferred(mut rx) => match rx.try_recv() {
                    Ok(bytes) => bytes,
                    Err(TryRecvError::Empty) => {
                        self.queue.push_front(InboundPayload::Deferred(rx));
                        break;
                    }
                    Err(TryRecvError::Closed) => {
                        tracing::warn!("terminal: deferred payload was dropped");
                        continue;
                    }
                },
            };
            self.decode_into(&bytes, &mut out);
        }
        out
    }

    /// Drain what is ready and emit any incomplete trailing sequence lossily.
    pub fn finish(&mut self) -> String {
        let mut out = self.drain();
        if !self.carry.is_empty() {
            out.push_str(&String::from_utf8_lossy(&self.carry));
            self.carry.clear();
        }
        self.queue.clear();
        out
    }

    fn decode_into(&mut self, bytes: &[u8], out: &mut String) {
        self.carry.extend_from_slice(bytes);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.carry.clear();
                    return;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            self.carry.drain(..valid_end);
                            return;
                        }
                    }
                }
            }
        }
    }
}
