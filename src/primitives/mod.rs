//! Low-level primitives and utilities
//!
//! Path canonicalization, burst coalescing and timer bookkeeping shared by the
//! tree synchronization and terminal layers.

pub mod coalesce;
pub mod path_utils;
pub mod timers;

pub use coalesce::Coalescer;
pub use timers::{AttemptId, TimerId, TimerQueue};
