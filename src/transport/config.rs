//! Transport-level settings.

use std::{sync::Arc, time::Duration};

use super::BackoffConfig;
use crate::{
    buffer::{AllocatorKind, BufferAllocator, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY},
    connection::{ConnectionOptions, DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_PENDING_BYTES},
};

/// Default time allowed for an outbound connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every connection of a transport or connector.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use framechain::{buffer::AllocatorKind, transport::TransportConfig};
///
/// let config = TransportConfig {
///     allocator: AllocatorKind::OnDemand,
///     connect_timeout: Duration::from_secs(5),
///     ..TransportConfig::default()
/// };
/// assert_eq!(config.read_buffer_size, 8 * 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Spare capacity reserved in each connection's read buffer.
    pub read_buffer_size: usize,
    /// Per-connection limit on unflushed outbound bytes; non-positive
    /// disables the limit.
    pub max_pending_bytes: i64,
    /// How read buffers are allocated.
    pub allocator: AllocatorKind,
    /// Idle buffers retained by the pooled allocator.
    pub pool_capacity: usize,
    /// Time allowed for an outbound connect.
    pub connect_timeout: Duration,
    /// Time a closing connection waits for queued bytes to be written.
    pub drain_timeout: Duration,
    /// Retry timing after failed accepts.
    pub backoff: BackoffConfig,
    /// Set `TCP_NODELAY` on every socket.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            allocator: AllocatorKind::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            backoff: BackoffConfig::default(),
            nodelay: true,
        }
    }
}

impl TransportConfig {
    /// Build the allocator described by this configuration.
    #[must_use]
    pub fn build_allocator(&self) -> Arc<dyn BufferAllocator> {
        self.allocator
            .build(self.read_buffer_size, self.pool_capacity)
    }

    pub(super) fn connection_options(&self, allocator: &Arc<dyn BufferAllocator>) -> ConnectionOptions {
        ConnectionOptions::default()
            .allocator(Arc::clone(allocator))
            .read_buffer_size(self.read_buffer_size)
            .max_pending_bytes(self.max_pending_bytes)
            .drain_timeout(self.drain_timeout)
    }
}
