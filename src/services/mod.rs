//! Network services and external integrations
//!
//! HTTP file API, the tree watch stream, remote terminals, and process-wide
//! concerns such as time and logging.

pub mod api;
pub mod http;
pub mod log_dirs;
pub mod terminal;
pub mod time_source;
#[cfg(feature = "runtime")]
pub mod tracing_setup;
pub mod watch;
