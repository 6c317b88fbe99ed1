//! Virtual-time scheduler for deferred timeline firings.
//!
//! Entries are kept sorted by `(fire time, insertion order)`, so equal fire
//! times are delivered in the order they were scheduled. Time only moves when
//! the owner advances it, which keeps playback deterministic under test.

#[derive(Debug, Clone)]
struct Scheduled<T> {
    at_ms: u64,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now_ms: u64,
    pending: Vec<Scheduled<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            pending: Vec::new(),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Schedule `payload` to fire at absolute time `at_ms`.
    pub fn schedule_at(&mut self, at_ms: u64, payload: T) {
        // After any entry with the same time: ties keep insertion order.
        let idx = self.pending.partition_point(|s| s.at_ms <= at_ms);
        self.pending.insert(idx, Scheduled { at_ms, payload });
    }

    /// Schedule `payload` to fire `delay_ms` after the current time.
    pub fn schedule_in(&mut self, delay_ms: u64, payload: T) {
        self.schedule_at(self.now_ms.saturating_add(delay_ms), payload);
    }

    /// Advance the clock by `delta_ms` and return every due payload in order.
    pub fn advance_by(&mut self, delta_ms: u64) -> Vec<T> {
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        self.drain_due()
    }

    /// Advance the clock to `at_ms` (never backwards) and return due payloads.
    pub fn advance_to(&mut self, at_ms: u64) -> Vec<T> {
        self.now_ms = self.now_ms.max(at_ms);
        self.drain_due()
    }

    /// Fire time of the latest pending entry.
    pub fn last_due_ms(&self) -> Option<u64> {
        self.pending.last().map(|s| s.at_ms)
    }

    /// Fire time of the earliest pending entry.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.first().map(|s| s.at_ms)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending entry without firing it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn drain_due(&mut self) -> Vec<T> {
        let now = self.now_ms;
        let due = self.pending.partition_point(|s| s.at_ms <= now);
        self.pending.drain(..due).map(|s| s.payload).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nothing_fires_before_its_time() {
        let mut s = Scheduler::new();
        s.schedule_in(2000, "trip");
        assert!(s.advance_by(1999).is_empty());
        assert_eq!(s.advance_by(1), vec!["trip"]);
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn equal_times_fire_in_insertion_order() {
        let mut s = Scheduler::new();
        s.schedule_at(100, "b");
        s.schedule_at(50, "a");
        s.schedule_at(100, "c");
        assert_eq!(s.next_due_ms(), Some(50));
        assert_eq!(s.last_due_ms(), Some(100));
        assert_eq!(s.advance_to(100), vec!["a", "b", "c"]);
    }

    #[test]
    fn advance_to_never_rewinds() {
        let mut s: Scheduler<u8> = Scheduler::new();
        s.advance_by(500);
        s.advance_to(100);
        assert_eq!(s.now_ms(), 500);
        s.schedule_in(10, 1);
        assert_eq!(s.next_due_ms(), Some(510));
    }

    #[test]
    fn clear_drops_pending() {
        let mut s = Scheduler::new();
        s.schedule_in(10, 1);
        s.schedule_in(20, 2);
        s.clear();
        assert!(s.advance_by(100).is_empty());
    }

    proptest! {
        #[test]
        fn delivery_is_sorted_by_time_then_insertion(times in proptest::collection::vec(0u64..1_000, 0..50)) {
            let mut s = Scheduler::new();
            for (i, t) in times.iter().enumerate() {
                s.schedule_at(*t, (*t, i));
            }
            let fired = s.advance_to(1_000);
            prop_assert_eq!(fired.len(), times.len());
            for pair in fired.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
