//! Tracing subscriber setup
//!
//! The client logs to a file so that terminal output on stdout stays clean.
//! `RUST_LOG` overrides the default DEBUG level.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber writing to `log_file_path`.
///
/// Returns false if the file could not be created or a subscriber was
/// already installed.
pub fn init_global(log_file_path: &Path) -> bool {
    let Ok(log_file) = File::create(log_file_path) else {
        return false;
    };
    build_subscriber(log_file).try_init().is_ok()
}

/// Build the file-logging subscriber shared by the client and tests.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .from_env_lossy();
    // ureq logs every request at debug
    if let Ok(directive) = "ureq=warn".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
