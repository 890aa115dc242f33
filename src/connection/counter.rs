//! Process-wide bookkeeping of connection actors.

use std::sync::atomic::{AtomicU64, Ordering};

static RUNNING: AtomicU64 = AtomicU64::new(0);
static OPENED: AtomicU64 = AtomicU64::new(0);

/// Held by a connection actor while it runs.
///
/// Creating the guard counts the actor as running, and dropping it removes
/// it again, from the process totals and from the
/// `framechain_connections_active` gauge alike.
#[must_use = "the actor stops being counted when the guard is dropped"]
pub(super) struct ActiveConnection {
    running_at_open: u64,
}

impl ActiveConnection {
    pub(super) fn open() -> Self {
        let running_at_open = RUNNING.fetch_add(1, Ordering::AcqRel) + 1;
        OPENED.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self { running_at_open }
    }

    /// Actors running when this one opened, itself included.
    pub(super) fn running_at_open(&self) -> u64 { self.running_at_open }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        RUNNING.fetch_sub(1, Ordering::AcqRel);
        crate::metrics::dec_connections();
    }
}

/// Number of connection actors currently running in this process.
#[must_use]
pub fn active_connection_count() -> u64 { RUNNING.load(Ordering::Acquire) }

/// Connections opened since the process started, closed ones included.
#[must_use]
pub fn opened_connection_count() -> u64 { OPENED.load(Ordering::Relaxed) }
