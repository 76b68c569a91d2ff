//! Monotonic hardware event numbering.
//!
//! Each controller numbers the [`HardwareEvent`](crate::HardwareEvent)s it
//! forwards, so the state machine can detect stale, duplicate and conflicting
//! events.  The counter lives behind an `Arc` and outlives the read loop, so
//! a restarted controller keeps counting where the dead one stopped.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free, strictly increasing event counter.
///
/// # Examples
///
/// ```rust
/// use table_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::starting_at(1);
/// assert_eq!(counter.last_issued(), None);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// assert_eq!(counter.last_issued(), Some(2));
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    first: u64,
    upcoming: AtomicU64,
}

impl SequenceCounter {
    /// Creates a counter whose first issued value is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            first,
            upcoming: AtomicU64::new(first),
        }
    }

    /// Issues the next sequence number.
    pub fn next(&self) -> u64 {
        // Relaxed: the value orders events, it does not publish memory.
        self.upcoming.fetch_add(1, Ordering::Relaxed)
    }

    /// The most recently issued value, or `None` before the first call.
    pub fn last_issued(&self) -> Option<u64> {
        let upcoming = self.upcoming.load(Ordering::Relaxed);
        (upcoming != self.first).then(|| upcoming - 1)
    }
}
