//! Lifecycle state shared between a connection handle and its actor.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`Connection`](super::Connection).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Spawned; the actor has not started yet.
    Connecting = 0,
    /// Events are being dispatched.
    Open = 1,
    /// The close pass is running; writes are refused.
    Closing = 2,
    /// Torn down. No further events are dispatched.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Atomic cell holding a [`ConnectionState`].
///
/// States only move forward: setting an earlier state is ignored.
pub(super) struct StateCell(AtomicU8);

impl StateCell {
    pub(super) fn new() -> Self { Self(AtomicU8::new(ConnectionState::Connecting as u8)) }

    pub(super) fn get(&self) -> ConnectionState { ConnectionState::from_u8(self.0.load(Ordering::Acquire)) }

    pub(super) fn set(&self, state: ConnectionState) { self.0.fetch_max(state as u8, Ordering::AcqRel); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_never_moves_backwards() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ConnectionState::Connecting);
        cell.set(ConnectionState::Closing);
        cell.set(ConnectionState::Open);
        assert_eq!(cell.get(), ConnectionState::Closing);
        cell.set(ConnectionState::Closed);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }
}
