//! Errors raised by transports and connections.

use std::{io, time::Duration};

use thiserror::Error;

/// Failures binding, accepting, connecting or moving bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding a listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),

    /// Accepting a connection failed.
    #[error("accept error: {0}")]
    Accept(#[source] io::Error),

    /// Establishing an outbound connection failed.
    #[error("connect error: {0}")]
    Connect(#[source] io::Error),

    /// The outbound connection was not established in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Reading from or writing to the socket failed.
    #[error("transport i/o error: {0}")]
    Io(#[source] io::Error),

    /// The connection is closing or closed.
    #[error("connection closed")]
    Closed,

    /// Queuing more bytes would exceed the per-connection limit.
    #[error("pending write limit exceeded: {pending} bytes pending, limit {limit}")]
    PendingLimitExceeded {
        /// Bytes already queued when the write was refused.
        pending: usize,
        /// Configured limit.
        limit: usize,
    },

    /// `start` was called before any listener was bound.
    #[error("transport has no bound listener")]
    NotBound,
}
