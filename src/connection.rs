//! Connections and the actor driving each one.
//!
//! A [`Connection`] is a cloneable handle. The socket itself belongs to a
//! connection actor task, which reads inbound bytes into its buffer and runs
//! every chain event of the connection one after another. A second task per
//! connection drains the outbound queue to the socket in submission order.
//!
//! ```text
//! Connecting -> Open -> Closing -> Closed
//! ```
//!
//! The actor enters `Open` before the connect pass runs and `Closing` when a
//! close is requested, the peer disconnects, I/O fails or a filter fails.
//! `Closed` is reached once the close pass has run and the writer has
//! drained, or the drain timeout has passed; [`Connection::closed`] resolves
//! at that point.

mod actor;
mod counter;
mod outbound;
mod state;

use std::{
    fmt,
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
pub use counter::{active_connection_count, opened_connection_count};
pub use state::ConnectionState;
use state::StateCell;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub(crate) use self::outbound::WriteItem;
use self::{actor::ConnectionActor, outbound::Outbound};
use crate::{
    buffer::{AllocatorKind, BufferAllocator, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY},
    chain::FilterChain,
    completion::CompletionFuture,
    filter::Message,
    transport::TransportError,
};

/// Default limit on unflushed outbound bytes per connection (4 MiB).
pub const DEFAULT_MAX_PENDING_BYTES: i64 = 4 * 1024 * 1024;

/// Default time the writer gets to flush queued bytes once a connection
/// closes.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Settings applied to a connection when it is spawned.
#[derive(Clone)]
pub struct ConnectionOptions {
    pub(crate) allocator: Arc<dyn BufferAllocator>,
    pub(crate) read_buffer_size: usize,
    pub(crate) max_pending_bytes: Option<usize>,
    pub(crate) drain_timeout: Duration,
    pub(crate) parent: Option<CancellationToken>,
    pub(crate) tracker: Option<TaskTracker>,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) peer_addr: Option<SocketAddr>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            allocator: AllocatorKind::default().build(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            max_pending_bytes: pending_limit(DEFAULT_MAX_PENDING_BYTES),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            parent: None,
            tracker: None,
            local_addr: None,
            peer_addr: None,
        }
    }
}

pub(crate) fn pending_limit(max_pending_bytes: i64) -> Option<usize> {
    usize::try_from(max_pending_bytes).ok().filter(|limit| *limit > 0)
}

impl ConnectionOptions {
    /// Allocate the read buffer from `allocator`.
    #[must_use]
    pub fn allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Spare capacity kept in the read buffer.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Limit on unflushed outbound bytes; a non-positive value disables it.
    #[must_use]
    pub fn max_pending_bytes(mut self, max_pending_bytes: i64) -> Self {
        self.max_pending_bytes = pending_limit(max_pending_bytes);
        self
    }

    /// Time allowed for queued bytes to reach the socket after close.
    ///
    /// A peer that stops reading cannot hold the close open past this; the
    /// remaining bytes are dropped.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Close the connection when `token` is cancelled.
    #[must_use]
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    pub(crate) fn tracked(mut self, tracker: TaskTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub(crate) fn addrs(mut self, local: Option<SocketAddr>, peer: Option<SocketAddr>) -> Self {
        self.local_addr = local;
        self.peer_addr = peer;
        self
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("allocator", &self.allocator.name())
            .field("read_buffer_size", &self.read_buffer_size)
            .field("max_pending_bytes", &self.max_pending_bytes)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) enum Command {
    Write(Message),
}

struct ConnectionInner {
    id: ConnectionId,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    state: StateCell,
    commands: mpsc::UnboundedSender<Command>,
    outbound: Outbound,
    token: CancellationToken,
    closed: CompletionFuture<()>,
    silent: AtomicBool,
}

/// Cloneable handle to a running connection.
///
/// Clones refer to the same connection. Holding a handle does not keep the
/// connection open.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Run `chain` over `stream` on a new connection actor.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Examples
    ///
    /// ```
    /// use framechain::{
    ///     chain::FilterChainBuilder,
    ///     connection::{Connection, ConnectionOptions, ConnectionState},
    ///     filters::EchoFilter,
    /// };
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let (stream, _peer) = tokio::io::duplex(64);
    /// let chain = FilterChainBuilder::new().add(EchoFilter).build();
    /// let conn = Connection::spawn(stream, chain, ConnectionOptions::default());
    /// conn.close().await.expect("closed");
    /// assert_eq!(conn.state(), ConnectionState::Closed);
    /// # }
    /// ```
    pub fn spawn<S>(stream: S, chain: FilterChain, options: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let token = options
            .parent
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let (outbound, writer_task) =
            outbound::spawn_writer(writer, options.max_pending_bytes, token.clone());
        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                local_addr: options.local_addr,
                peer_addr: options.peer_addr,
                state: StateCell::new(),
                commands: commands_tx,
                outbound,
                token,
                closed: CompletionFuture::new(),
                silent: AtomicBool::new(false),
            }),
        };
        let buffer = options.allocator.allocate(options.read_buffer_size);
        let actor = ConnectionActor::new(
            connection.clone(),
            chain,
            reader,
            commands_rx,
            writer_task,
            buffer,
            options.read_buffer_size,
            options.drain_timeout,
        );
        actor::spawn(actor, options.tracker.as_ref());
        connection
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.inner.id }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.inner.state.get() }

    /// Returns `true` while the connection accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// Local socket address, if known.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.inner.local_addr }

    /// Remote socket address, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.peer_addr }

    /// Send `message` through the chain, starting at its application end.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection is closing.
    pub fn write(&self, message: impl Into<Message>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.inner
            .commands
            .send(Command::Write(message.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Hand already-encoded bytes to the writer, bypassing the chain.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection is closing, or
    /// [`TransportError::PendingLimitExceeded`] if the bytes do not fit the
    /// pending-bytes limit.
    pub fn enqueue(&self, bytes: Bytes) -> Result<(), TransportError> {
        if matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return Err(TransportError::Closed);
        }
        self.inner.outbound.enqueue(bytes)
    }

    /// Bytes handed to the writer but not yet written to the socket.
    #[must_use]
    pub fn pending_bytes(&self) -> usize { self.inner.outbound.pending() }

    /// Request closure and return a future resolving once closed.
    pub fn close(&self) -> CompletionFuture<()> {
        self.inner.token.cancel();
        self.inner.closed.clone()
    }

    /// Like [`close`](Self::close), but report teardown failures at debug
    /// level only.
    pub fn close_silently(&self) -> CompletionFuture<()> {
        self.inner.silent.store(true, Ordering::Relaxed);
        self.close()
    }

    /// Future resolving once the connection is closed, without requesting
    /// closure.
    #[must_use]
    pub fn closed(&self) -> CompletionFuture<()> { self.inner.closed.clone() }

    pub(crate) fn is_silent(&self) -> bool { self.inner.silent.load(Ordering::Relaxed) }

    pub(crate) fn set_state(&self, state: ConnectionState) { self.inner.state.set(state); }

    pub(crate) fn token(&self) -> &CancellationToken { &self.inner.token }

    /// Resolves once closure has been requested.
    pub(crate) fn closing(&self) -> impl Future<Output = ()> + Send + '_ {
        self.inner.token.cancelled()
    }

    pub(crate) fn finish(&self) { self.inner.closed.result(()); }

    pub(crate) fn outbound(&self) -> &Outbound { &self.inner.outbound }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("peer_addr", &self.inner.peer_addr)
            .finish_non_exhaustive()
    }
}
