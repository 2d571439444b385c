//! Remote terminal sessions over WebSocket.

pub mod frame;
pub mod host;
#[cfg(feature = "runtime")]
pub mod keys;
pub mod multiplexer;
pub mod session;
pub mod transport;

pub use frame::{ControlMessage, InboundPayload, OutboundFrame, OutputDecoder, TerminalSize};
pub use host::TerminalHost;
pub use multiplexer::{FocusPolicy, MuxCommand, MuxError, TerminalMultiplexer};
pub use session::{
    SessionOptions, TerminalCommand, TerminalEvent, TerminalId, TerminalSession, TerminalState,
};
pub use transport::{TerminalConnector, TerminalLink, TerminalUrlError, WsTerminalConnector};
