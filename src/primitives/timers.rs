//! Single-shot timer bookkeeping for event loops.
//!
//! The queue does not sleep; callers ask for the next deadline, wait however
//! they like, then collect expired timers. Cancelling is synchronous: a
//! cancelled timer never fires, even if its deadline already passed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ATTEMPT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl TimerId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

/// Identifier of one connection attempt of a transport.
///
/// Events are tagged with the attempt that produced them so that a state
/// machine can drop events from connections it already replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl AttemptId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_ATTEMPT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attempt({})", self.0)
    }
}

/// Shortest reconnect delay accepted from configuration.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);
/// Longest reconnect delay accepted from configuration.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Clamp a configured reconnect delay into the supported range.
pub fn bounded_reconnect_delay(delay: Duration) -> Duration {
    delay.clamp(MIN_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: BTreeMap<TimerId, Instant>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule (or reschedule) `id` to fire at `deadline`.
    pub fn schedule(&mut self, id: TimerId, deadline: Instant) {
        self.timers.insert(id, deadline);
    }

    /// Cancel `id`. Returns true if it was pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.timers.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_is_bounded() {
        assert_eq!(bounded_reconnect_delay(Duration::ZERO), MIN_RECONNECT_DELAY);
        assert_eq!(
            bounded_reconnect_delay(Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(
            bounded_reconnect_delay(Duration::from_secs(3600)),
            MAX_RECONNECT_DELAY
        );
    }

    #[test]
    fn test_timer_ids_are_unique() {
        assert_ne!(TimerId::next(), TimerId::next());
    }

    #[test]
    fn test_pop_expired_in_deadline_order() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(TimerId(1), now + Duration::from_secs(2));
        q.schedule(TimerId(2), now + Duration::from_secs(1));
        q.schedule(TimerId(3), now + Duration::from_secs(10));

        assert_eq!(q.next_deadline(), Some(now + Duration::from_secs(1)));
        assert_eq!(
            q.pop_expired(now + Duration::from_secs(3)),
            vec![TimerId(2), TimerId(1)]
        );
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.schedule(TimerId(7), now);
        assert!(q.cancel(TimerId(7)));
        assert!(!q.cancel(TimerId(7)));
        assert!(q.pop_expired(now + Duration::from_secs(1)).is_empty());
        assert!(q.is_empty());
    }
}
