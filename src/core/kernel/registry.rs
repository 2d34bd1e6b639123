use crate::core::errors::BybitError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Callback invoked for every event routed to a subscription key
pub type Callback<E> = Arc<dyn Fn(E) -> Result<(), BybitError> + Send + Sync>;

/// Maps a subscription key to exactly one callback.
///
/// Mutated from caller context (subscribe/unsubscribe) and read from the
/// stream's read task; the map is sharded and locked internally, and
/// callbacks run after the shard lock has been released so a callback may
/// itself subscribe or unsubscribe.
pub struct SubscriptionRegistry<K, E> {
    entries: DashMap<K, Callback<E>>,
}

impl<K, E> Default for SubscriptionRegistry<K, E>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> SubscriptionRegistry<K, E>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a callback, failing if the key already has one
    pub fn register(&self, key: K, callback: Callback<E>) -> Result<(), BybitError> {
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => Err(BybitError::DuplicateSubscription(format!(
                "{:?}",
                occupied.key()
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(callback);
                Ok(())
            }
        }
    }

    /// Remove a registration; absent keys are ignored
    pub fn unregister(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Invoke the callback registered for `key`, propagating its result
    pub fn dispatch(&self, key: &K, event: E) -> Result<(), BybitError> {
        let callback = self
            .entries
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BybitError::UnregisteredTopic(format!("{:?}", key)))?;

        callback(event)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
