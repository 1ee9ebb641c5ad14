//! # Metadata Store
//!
//! Per-owner mapping of string keys to string values, replicated by
//! broadcasting every mutation.
//!
//! ## Consistency
//!
//! The store applies whatever it is handed: last applied operation wins for a
//! `(owner, key)` pair. There is no logical clock. The reliable channel's
//! per-sender ordering is the only ordering signal, so two observers may
//! disagree transiently when different senders race on the same key.
//!
//! ## Listeners
//!
//! Listeners run synchronously inside [`MetadataStore::write`] /
//! [`MetadataStore::remove`], in registration order. They receive the event
//! only, never the store, so they cannot mutate it from inside the callback.

use std::collections::HashMap;

use tether_shared::ParticipantId;

/// A change raised by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataEvent {
    /// A key was written.
    Changed {
        /// Owner of the key.
        owner: ParticipantId,
        /// Key that changed.
        key: String,
        /// New value.
        value: String,
    },
    /// A key was deleted.
    Removed {
        /// Owner of the key.
        owner: ParticipantId,
        /// Key that was deleted.
        key: String,
        /// Value the key held before deletion.
        value: String,
    },
}

impl MetadataEvent {
    /// Owner of the affected key.
    #[must_use]
    pub fn owner(&self) -> ParticipantId {
        match self {
            Self::Changed { owner, .. } | Self::Removed { owner, .. } => *owner,
        }
    }

    /// The affected key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Changed { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// New value for `Changed`, previous value for `Removed`.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Changed { value, .. } | Self::Removed { value, .. } => value,
        }
    }
}

/// What a listener wants to hear about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataInterest {
    /// Every change to every key.
    All,
    /// Changes to one key, for any owner.
    Key(String),
}

impl MetadataInterest {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Key(k) => k == key,
        }
    }
}

/// Callback invoked for every matching [`MetadataEvent`].
pub type MetadataListener = Box<dyn FnMut(&MetadataEvent) + Send>;

/// Handle returned by [`MetadataStore::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    interest: MetadataInterest,
    listener: MetadataListener,
}

/// Local copy of the session's metadata.
#[derive(Default)]
pub struct MetadataStore {
    entries: HashMap<ParticipantId, HashMap<String, String>>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `(owner, key)` and raises [`MetadataEvent::Changed`].
    ///
    /// The event fires even when the value is unchanged. Returns true if the
    /// stored value is new or different.
    pub fn write(&mut self, owner: ParticipantId, key: &str, value: &str) -> bool {
        let slot = self.entries.entry(owner).or_default();
        let changed = slot.get(key).map_or(true, |old| old != value);
        slot.insert(key.to_string(), value.to_string());

        self.notify(&MetadataEvent::Changed {
            owner,
            key: key.to_string(),
            value: value.to_string(),
        });
        changed
    }

    /// Deletes `(owner, key)` and raises [`MetadataEvent::Removed`].
    ///
    /// Returns false, without raising anything, if the pair did not exist.
    pub fn remove(&mut self, owner: ParticipantId, key: &str) -> bool {
        let Some(slot) = self.entries.get_mut(&owner) else {
            return false;
        };
        let Some(value) = slot.remove(key) else {
            return false;
        };
        if slot.is_empty() {
            self.entries.remove(&owner);
        }

        self.notify(&MetadataEvent::Removed {
            owner,
            key: key.to_string(),
            value,
        });
        true
    }

    /// Reads the live value of `(owner, key)`.
    #[must_use]
    pub fn read(&self, owner: ParticipantId, key: &str) -> Option<&str> {
        self.entries.get(&owner)?.get(key).map(String::as_str)
    }

    /// All `(key, value)` pairs of one owner, sorted by key.
    #[must_use]
    pub fn entries_for(&self, owner: ParticipantId) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .entries
            .get(&owner)
            .map(|slot| slot.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    /// Deletes every key of a departing owner, raising one removal per key.
    ///
    /// Returns the number of keys removed.
    pub fn remove_owner(&mut self, owner: ParticipantId) -> usize {
        let Some(slot) = self.entries.remove(&owner) else {
            return 0;
        };
        let mut pairs: Vec<_> = slot.into_iter().collect();
        pairs.sort();

        let count = pairs.len();
        for (key, value) in pairs {
            self.notify(&MetadataEvent::Removed { owner, key, value });
        }
        count
    }

    /// Drops every entry without raising events. Listeners stay registered.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live `(owner, key)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Returns true if no pair is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a listener. Listeners are called in registration order.
    pub fn subscribe(
        &mut self,
        interest: MetadataInterest,
        listener: MetadataListener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.push(Subscription {
            id,
            interest,
            listener,
        });
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn notify(&mut self, event: &MetadataEvent) {
        for subscription in &mut self.subscriptions {
            if subscription.interest.matches(event.key()) {
                (subscription.listener)(event);
            }
        }
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("entries", &self.entries)
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

/// Something that can mutate metadata on behalf of a caller.
///
/// The caller decides whether it is allowed to touch a key; implementors do
/// not check authority.
pub trait MetadataWriter {
    /// Requests that `(owner, key)` be set to `value`.
    ///
    /// Returns false if the request could not be issued.
    fn try_set_metadata(&mut self, owner: ParticipantId, key: &str, value: &str) -> bool;

    /// Requests that `(owner, key)` be removed.
    ///
    /// Returns false if the request could not be issued.
    fn try_remove_metadata(&mut self, owner: ParticipantId, key: &str) -> bool;
}

/// Immediate, local-only writes. Used by single-process tools and tests.
impl MetadataWriter for MetadataStore {
    fn try_set_metadata(&mut self, owner: ParticipantId, key: &str, value: &str) -> bool {
        self.write(owner, key, value);
        true
    }

    fn try_remove_metadata(&mut self, owner: ParticipantId, key: &str) -> bool {
        self.remove(owner, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const P1: ParticipantId = ParticipantId(1);
    const P2: ParticipantId = ParticipantId(2);

    fn recorder(
        store: &mut MetadataStore,
        interest: MetadataInterest,
    ) -> Arc<Mutex<Vec<MetadataEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(interest, Box::new(move |e| sink.lock().push(e.clone())));
        seen
    }

    #[test]
    fn test_write_read_overwrite() {
        let mut store = MetadataStore::new();
        assert!(store.write(P1, "Team", "Red"));
        assert_eq!(store.read(P1, "Team"), Some("Red"));
        assert!(!store.write(P1, "Team", "Red"));
        assert!(store.write(P1, "Team", "Blue"));
        assert_eq!(store.read(P1, "Team"), Some("Blue"));
        assert_eq!(store.read(P2, "Team"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_is_not_empty_write() {
        let mut store = MetadataStore::new();
        store.write(P1, "Flag", "");
        assert_eq!(store.read(P1, "Flag"), Some(""));
        assert!(store.remove(P1, "Flag"));
        assert_eq!(store.read(P1, "Flag"), None);
        assert!(!store.remove(P1, "Flag"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_events_carry_values() {
        let mut store = MetadataStore::new();
        let seen = recorder(&mut store, MetadataInterest::All);

        store.write(P1, "Score", "10");
        store.write(P1, "Score", "10");
        store.remove(P1, "Score");
        store.remove(P1, "Score");

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].value(), "10");
        assert_eq!(seen[1].value(), "10");
        assert_eq!(
            seen[2],
            MetadataEvent::Removed {
                owner: P1,
                key: "Score".into(),
                value: "10".into()
            }
        );
    }

    #[test]
    fn test_key_interest_filters() {
        let mut store = MetadataStore::new();
        let teams = recorder(&mut store, MetadataInterest::Key("Team".into()));

        store.write(P1, "Score", "1");
        store.write(P2, "Team", "Red");

        let teams = teams.lock();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].owner(), P2);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let mut store = MetadataStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = Arc::clone(&order);
            store.subscribe(MetadataInterest::All, Box::new(move |_| order.lock().push(tag)));
        }
        store.write(P1, "k", "v");
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut store = MetadataStore::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(MetadataInterest::All, Box::new(move |_| *sink.lock() += 1));

        store.write(P1, "a", "1");
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.write(P1, "a", "2");
        assert_eq!(*seen.lock(), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_remove_owner_raises_per_key() {
        let mut store = MetadataStore::new();
        store.write(P1, "b", "2");
        store.write(P1, "a", "1");
        store.write(P2, "a", "x");
        let seen = recorder(&mut store, MetadataInterest::All);

        assert_eq!(store.remove_owner(P1), 2);
        assert_eq!(store.remove_owner(P1), 0);
        assert_eq!(store.entries_for(P2), vec![("a".to_string(), "x".to_string())]);

        let keys: Vec<_> = seen.lock().iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_clear_is_silent() {
        let mut store = MetadataStore::new();
        store.write(P1, "a", "1");
        let seen = recorder(&mut store, MetadataInterest::All);
        store.clear();
        assert!(store.is_empty());
        assert!(seen.lock().is_empty());
        assert_eq!(store.listener_count(), 1);
    }
}
