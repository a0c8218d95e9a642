//! Storage side-channel: a key/value area scripts can reach that sits
//! outside the reactive graph. Writing here never schedules anything.

use dashmap::DashMap;
use rhai::Dynamic;
use std::sync::Arc;

/// Thread-safe, cheap-to-clone session storage.
#[derive(Clone, Default)]
pub struct StorageChannel {
    entries: Arc<DashMap<String, Dynamic>>,
}

impl StorageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_storage_value(&self, key: &str) -> Option<Dynamic> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn has_storage_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, sorted.
    pub fn get_storage_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn set_storage_value(&self, key: impl Into<String>, value: Dynamic) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove_storage_value(&self, key: &str) -> Option<Dynamic> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_round_trip_and_sorted_keys() {
        let storage = StorageChannel::new();
        storage.set_storage_value("zeta", Dynamic::from(1_i64));
        storage.set_storage_value("alpha", Dynamic::from("a".to_string()));

        assert!(storage.has_storage_key("zeta"));
        assert!(!storage.has_storage_key("beta"));
        assert_eq!(storage.get_storage_keys(), vec!["alpha", "zeta"]);
        assert_eq!(
            storage.get_storage_value("zeta").unwrap().as_int().unwrap(),
            1
        );
    }

    #[test]
    fn test_clones_share_entries() {
        let storage = StorageChannel::new();
        let other = storage.clone();
        other.set_storage_value("k", Dynamic::from(true));
        assert_eq!(storage.len(), 1);
        assert!(storage.remove_storage_value("k").is_some());
        assert!(other.is_empty());
    }
}
