//! Per-connection state for filters shared across connections.

use std::fmt;

use dashmap::DashMap;

use crate::connection::ConnectionId;

/// Concurrent side table holding one filter's state per connection.
///
/// Entries are created on first use and removed when the connection closes.
/// Each access holds the entry's shard lock, so the state of one connection
/// is never mutated concurrently.
pub struct ConnectionStates<S>(DashMap<ConnectionId, S>);

impl<S> Default for ConnectionStates<S> {
    fn default() -> Self { Self(DashMap::new()) }
}

impl<S> ConnectionStates<S> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Run `f` on the state of `id`, creating it with `init` first if absent.
    pub fn with<R>(&self, id: ConnectionId, init: impl FnOnce() -> S, f: impl FnOnce(&mut S) -> R) -> R {
        let mut entry = self.0.entry(id).or_insert_with(init);
        f(entry.value_mut())
    }

    /// Replace the state of `id`.
    pub fn insert(&self, id: ConnectionId, state: S) { self.0.insert(id, state); }

    /// Remove and return the state of `id`, typically on close.
    pub fn remove(&self, id: ConnectionId) -> Option<S> { self.0.remove(&id).map(|(_, state)| state) }

    /// Returns `true` if `id` has state.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool { self.0.contains_key(&id) }

    /// Number of connections with state.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` if no connection has state.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<S: Copy> ConnectionStates<S> {
    /// Copy of the state of `id`, if present.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<S> { self.0.get(&id).map(|entry| *entry) }
}

impl<S> fmt::Debug for ConnectionStates<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStates").field("connections", &self.0.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_created_lazily_and_removed() {
        let states = ConnectionStates::<Vec<u8>>::new();
        let a = ConnectionId::from(1);
        let b = ConnectionId::from(2);

        states.with(a, Vec::new, |buf| buf.push(1));
        states.with(a, Vec::new, |buf| buf.push(2));
        states.with(b, || vec![9], |_| ());

        assert_eq!(states.len(), 2);
        assert_eq!(states.remove(a), Some(vec![1, 2]));
        assert!(!states.contains(a));
        assert_eq!(states.remove(a), None);
        assert_eq!(states.remove(b), Some(vec![9]));
        assert!(states.is_empty());
    }
}
