//! Coalescing write queue.
//!
//! External writes land here instead of in the store. Successive writes to
//! the same name overwrite each other, and the whole burst is released only
//! once no write has arrived for the settle window (or an immediate write
//! forces it out).

use indexmap::IndexMap;
use rhai::Dynamic;
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct PendingWrite {
    pub value: Dynamic,
    pub forced: bool,
}

#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    pending: IndexMap<String, PendingWrite>,
    last_write: Option<Duration>,
    immediate: bool,
    coalesced: u64,
}

impl WriteQueue {
    pub fn push(&mut self, name: String, value: Dynamic, forced: bool, now: Duration) {
        match self.pending.get_mut(&name) {
            Some(existing) => {
                existing.value = value;
                existing.forced |= forced;
                self.coalesced += 1;
            }
            None => {
                self.pending.insert(name, PendingWrite { value, forced });
            }
        }
        self.last_write = Some(now);
    }

    pub fn push_immediate(&mut self, name: String, value: Dynamic, forced: bool, now: Duration) {
        self.push(name, value, forced, now);
        self.immediate = true;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remaining time before the burst settles, `None` when already settled or empty.
    pub fn wait_time(&self, now: Duration, window: Duration) -> Option<Duration> {
        if self.pending.is_empty() || self.immediate {
            return None;
        }
        let last = self.last_write?;
        let due = last + window;
        if now >= due { None } else { Some(due - now) }
    }

    pub fn is_settled(&self, now: Duration, window: Duration) -> bool {
        !self.pending.is_empty() && self.wait_time(now, window).is_none()
    }

    /// Mark the current burst as settled regardless of the window.
    pub fn settle_now(&mut self) {
        if !self.pending.is_empty() {
            self.immediate = true;
        }
    }

    pub fn drain(&mut self) -> Vec<(String, PendingWrite)> {
        self.last_write = None;
        self.immediate = false;
        self.pending.drain(..).collect()
    }

    /// Number of writes swallowed by coalescing since creation.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_last_write_wins_within_burst() {
        let mut queue = WriteQueue::default();
        queue.push("a".into(), Dynamic::from(1_i64), false, ms(0));
        queue.push("a".into(), Dynamic::from(2_i64), false, ms(10));
        queue.push("b".into(), Dynamic::from(9_i64), false, ms(15));
        queue.push("a".into(), Dynamic::from(3_i64), false, ms(20));

        assert!(!queue.is_settled(ms(40), ms(50)));
        assert_eq!(queue.wait_time(ms(40), ms(50)), Some(ms(30)));
        assert!(queue.is_settled(ms(70), ms(50)));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, "a");
        assert_eq!(drained[0].1.value.as_int().unwrap(), 3);
        assert_eq!(queue.coalesced(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_immediate_write_settles_burst() {
        let mut queue = WriteQueue::default();
        queue.push("a".into(), Dynamic::from(1_i64), false, ms(0));
        queue.push_immediate("b".into(), Dynamic::from(2_i64), false, ms(1));
        assert!(queue.is_settled(ms(1), ms(50)));
    }
}
