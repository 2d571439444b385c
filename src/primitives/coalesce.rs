//! Burst coalescing.
//!
//! A [`Coalescer`] absorbs a burst of values (for example the stream of sizes
//! produced while a window is being dragged) and yields only the last one,
//! once no new value has arrived for a full quiet period. It is driven by
//! explicit instants so it works the same with a real or a logical clock.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Coalescer<T> {
    quiet_period: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Coalescer<T> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Record a new value, restarting the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Take the settled value if the quiet period has elapsed since the last push.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.quiet_period => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// Take the pending value without waiting for it to settle.
    pub fn take_latest(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// When the pending value will settle, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.quiet_period)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any pending value.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
