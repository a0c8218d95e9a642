//! The variable store: named, versioned values with per-name subscribers.
//!
//! The store is a cheap-to-clone handle. Reads see committed values only.
//! External [`VariableStore::set`] calls go through the coalescing write
//! queue and are committed by the scheduler when their burst settles, so a
//! subscriber is never told about a value that has not been committed.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rhai::Dynamic;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::clock::Clock;
use crate::queue::{PendingWrite, WriteQueue};
use crate::value::StoreValue;

/// Subscriber callback: receives the variable name and its committed value.
pub type SubscriberFn = dyn Fn(&str, &StoreValue) + Send + Sync;

struct Variable {
    value: StoreValue,
    version: u64,
    subscribers: Vec<(u64, Arc<SubscriberFn>)>,
}

impl Variable {
    fn new() -> Self {
        Variable {
            value: StoreValue::Undefined,
            version: 0,
            subscribers: Vec::new(),
        }
    }
}

struct StoreInner {
    vars: RwLock<IndexMap<String, Variable>>,
    queue: Mutex<WriteQueue>,
    clock: Arc<dyn Clock>,
    next_subscription: AtomicU64,
}

/// Shared handle to the notebook's variables.
#[derive(Clone)]
pub struct VariableStore {
    inner: Arc<StoreInner>,
}

/// Handle returned by [`VariableStore::subscribe`].
pub struct Subscription {
    store: Weak<StoreInner>,
    name: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Stop receiving notifications. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut vars = inner.vars.write();
        if let Some(var) = vars.get_mut(&self.name) {
            var.subscribers.retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl VariableStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        VariableStore {
            inner: Arc::new(StoreInner {
                vars: RwLock::new(IndexMap::new()),
                queue: Mutex::new(WriteQueue::default()),
                clock,
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Current committed value of `name` (`Undefined` when never written).
    pub fn get(&self, name: &str) -> StoreValue {
        self.inner
            .vars
            .read()
            .get(name)
            .map(|var| var.value.clone())
            .unwrap_or_default()
    }

    /// Number of committed writes to `name`.
    pub fn version(&self, name: &str) -> u64 {
        self.inner
            .vars
            .read()
            .get(name)
            .map(|var| var.version)
            .unwrap_or(0)
    }

    /// Queue a write. Rapid writes to the same name are coalesced and only the
    /// last value reaches the store once the burst settles.
    pub fn set(&self, name: impl Into<String>, value: Dynamic) {
        let now = self.inner.clock.now();
        self.inner.queue.lock().push(name.into(), value, false, now);
    }

    /// Queue a write that propagates even if the value is unchanged.
    pub fn set_forced(&self, name: impl Into<String>, value: Dynamic) {
        let now = self.inner.clock.now();
        self.inner.queue.lock().push(name.into(), value, true, now);
    }

    /// Queue a write that skips the settle window: the next scheduler step
    /// commits it together with anything else pending.
    pub fn set_immediate(&self, name: impl Into<String>, value: Dynamic) {
        let now = self.inner.clock.now();
        self.inner
            .queue
            .lock()
            .push_immediate(name.into(), value, false, now);
    }

    /// Register `callback` for every committed write to `name`.
    ///
    /// Callbacks for one name run in subscription order, after the value is
    /// committed and outside of any store lock.
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&str, &StoreValue) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner
            .vars
            .write()
            .entry(name.clone())
            .or_insert_with(Variable::new)
            .subscribers
            .push((id, Arc::new(callback)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            name,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Names of all defined variables, in first-write order.
    pub fn variable_names(&self) -> Vec<String> {
        self.inner
            .vars
            .read()
            .iter()
            .filter(|(_, var)| !var.value.is_undefined())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether uncommitted writes are waiting in the queue.
    pub fn has_pending_writes(&self) -> bool {
        !self.inner.queue.lock().is_empty()
    }

    pub fn coalesced_writes(&self) -> u64 {
        self.inner.queue.lock().coalesced()
    }

    /// Commit a value, bump its version and notify subscribers.
    /// Returns whether the value differs from the previous one (or was forced).
    pub(crate) fn commit(&self, name: &str, value: StoreValue, forced: bool) -> bool {
        let (changed, subscribers) = {
            let mut vars = self.inner.vars.write();
            let var = vars.entry(name.to_string()).or_insert_with(Variable::new);
            let changed = forced || !var.value.same_as(&value);
            var.value = value.clone();
            var.version += 1;
            let subscribers: Vec<Arc<SubscriberFn>> =
                var.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            (changed, subscribers)
        };
        tracing::trace!(variable = name, changed, "committed");
        for callback in subscribers {
            callback(name, &value);
        }
        changed
    }

    /// Reset `name` to undefined and notify subscribers. With
    /// `drop_entry` the variable and its subscriber list are discarded
    /// afterwards. Returns whether the variable held a value.
    pub(crate) fn clear(&self, name: &str, drop_entry: bool) -> bool {
        let (had_value, subscribers) = {
            let mut vars = self.inner.vars.write();
            let Some(var) = vars.get_mut(name) else {
                return false;
            };
            let had_value = !var.value.is_undefined();
            var.value = StoreValue::Undefined;
            var.version += 1;
            let subscribers: Vec<Arc<SubscriberFn>> =
                var.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            (had_value, subscribers)
        };
        for callback in subscribers {
            callback(name, &StoreValue::Undefined);
        }
        if drop_entry {
            self.inner.vars.write().shift_remove(name);
        }
        had_value
    }

    /// Copy of every committed value.
    pub(crate) fn snapshot(&self) -> HashMap<String, StoreValue> {
        self.inner
            .vars
            .read()
            .iter()
            .map(|(name, var)| (name.clone(), var.value.clone()))
            .collect()
    }

    pub(crate) fn queue_wait(&self, window: Duration) -> Option<Duration> {
        let now = self.inner.clock.now();
        self.inner.queue.lock().wait_time(now, window)
    }

    /// Take the queued burst if it has settled.
    pub(crate) fn take_settled(&self, window: Duration) -> Option<Vec<(String, PendingWrite)>> {
        let now = self.inner.clock.now();
        let mut queue = self.inner.queue.lock();
        if queue.is_settled(now, window) {
            Some(queue.drain())
        } else {
            None
        }
    }

    pub(crate) fn settle_now(&self) {
        self.inner.queue.lock().settle_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> VariableStore {
        VariableStore::new(Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_get_unknown_is_undefined() {
        let store = store();
        assert!(store.get("missing").is_undefined());
        assert_eq!(store.version("missing"), 0);
    }

    #[test]
    fn test_commit_bumps_version_and_reports_change() {
        let store = store();
        assert!(store.commit("a", StoreValue::from(1_i64), false));
        assert!(!store.commit("a", StoreValue::from(1_i64), false));
        assert!(store.commit("a", StoreValue::from(1_i64), true));
        assert_eq!(store.version("a"), 3);
        assert_eq!(store.get("a"), StoreValue::from(1_i64));
    }

    #[test]
    fn test_subscribers_run_in_subscription_order() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();
        let _a = store.subscribe("x", move |_, _| first.lock().push("first"));
        let _b = store.subscribe("x", move |_, _| second.lock().push("second"));

        store.commit("x", StoreValue::from(1_i64), false);
        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_queued_set_is_not_visible_until_committed() {
        let store = store();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let _sub = store.subscribe("x", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set("x", Dynamic::from(5_i64));
        assert!(store.get("x").is_undefined());
        assert!(store.has_pending_writes());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let store = store();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let sub = store.subscribe("x", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        store.commit("x", StoreValue::from(1_i64), false);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_variable_names_skip_undefined_entries() {
        let store = store();
        let _sub = store.subscribe("later", |_, _| {});
        store.commit("b", StoreValue::from(1_i64), false);
        store.commit("a", StoreValue::from(2_i64), false);
        assert_eq!(store.variable_names(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_clear_notifies_and_drops_entry() {
        let store = store();
        let last = Arc::new(Mutex::new(None));
        let sink = last.clone();
        let _sub = store.subscribe("x", move |_, v| *sink.lock() = Some(v.clone()));
        store.commit("x", StoreValue::from(3_i64), false);

        assert!(store.clear("x", true));
        assert_eq!(*last.lock(), Some(StoreValue::Undefined));
        assert!(store.variable_names().is_empty());
        assert!(!store.clear("x", true));
    }
}
