//! TCP transports: listening servers and outbound connectors.
//!
//! A [`TcpTransport`] owns bound listeners and one accept loop per listener.
//! A [`TcpConnector`] establishes outbound connections. Both hand every
//! socket to a connection actor running the configured
//! [`FilterChain`], and both stop everything they spawned on shutdown.

mod accept;
mod backoff;
mod config;
mod connector;
pub mod error;

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

pub use backoff::BackoffConfig;
pub use config::{DEFAULT_CONNECT_TIMEOUT, TransportConfig};
pub use connector::TcpConnector;
pub use error::TransportError;
use log::info;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use self::accept::{AcceptLoopOptions, accept_loop};
use crate::{buffer::BufferAllocator, chain::FilterChain};

/// Listening TCP transport.
///
/// # Examples
///
/// ```no_run
/// use framechain::{stack::StackOptions, transport::TcpTransport};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), framechain::transport::TransportError> {
/// let mut transport = TcpTransport::new(StackOptions::default().server_chain());
/// transport.bind_port(7777)?;
/// transport.start()?;
/// tokio::signal::ctrl_c().await.ok();
/// transport.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport {
    chain: FilterChain,
    config: TransportConfig,
    allocator: Arc<dyn BufferAllocator>,
    listeners: Vec<Arc<TcpListener>>,
    running: bool,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TcpTransport {
    /// Create a transport with the default configuration.
    #[must_use]
    pub fn new(chain: FilterChain) -> Self { Self::with_config(chain, TransportConfig::default()) }

    /// Create a transport with `config`.
    #[must_use]
    pub fn with_config(chain: FilterChain, config: TransportConfig) -> Self {
        Self {
            allocator: config.build_allocator(),
            chain,
            config,
            listeners: Vec::new(),
            running: false,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &TransportConfig { &self.config }

    /// Bind a listener on `addr` and return its local address.
    ///
    /// Listeners bound after [`start`](Self::start) begin accepting
    /// immediately. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the address cannot be bound.
    pub fn bind(&mut self, addr: SocketAddr) -> Result<SocketAddr, TransportError> {
        let std_listener = StdTcpListener::bind(addr).map_err(TransportError::Bind)?;
        std_listener
            .set_nonblocking(true)
            .map_err(TransportError::Bind)?;
        let listener = Arc::new(TcpListener::from_std(std_listener).map_err(TransportError::Bind)?);
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        if self.running {
            self.spawn_accept_loop(Arc::clone(&listener));
        }
        self.listeners.push(listener);
        Ok(local_addr)
    }

    /// Bind a listener on every IPv4 interface at `port`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the port cannot be bound.
    pub fn bind_port(&mut self, port: u16) -> Result<SocketAddr, TransportError> {
        self.bind((Ipv4Addr::UNSPECIFIED, port).into())
    }

    /// Start accepting on every bound listener. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotBound`] if no listener is bound, or
    /// [`TransportError::Closed`] after shutdown.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.token.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.listeners.is_empty() {
            return Err(TransportError::NotBound);
        }
        if self.running {
            return Ok(());
        }
        self.running = true;
        for listener in self.listeners.clone() {
            self.spawn_accept_loop(listener);
        }
        info!("transport started: local_addrs={:?}", self.local_addrs());
        Ok(())
    }

    /// Addresses of every bound listener.
    #[must_use]
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }

    /// Returns `true` between [`start`](Self::start) and shutdown.
    #[must_use]
    pub fn is_running(&self) -> bool { self.running && !self.token.is_cancelled() }

    /// Stop accepting and close every connection without waiting.
    pub fn shutdown_now(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    /// Stop accepting, close every connection and wait for their tasks to
    /// finish.
    pub async fn shutdown(&self) {
        self.shutdown_now();
        self.tracker.wait().await;
        info!("transport stopped: local_addrs={:?}", self.local_addrs());
    }

    fn spawn_accept_loop(&self, listener: Arc<TcpListener>) {
        self.tracker.spawn(accept_loop(
            listener,
            AcceptLoopOptions {
                chain: self.chain.clone(),
                connection: self.config.connection_options(&self.allocator),
                shutdown: self.token.clone(),
                tracker: self.tracker.clone(),
                backoff: self.config.backoff,
                nodelay: self.config.nodelay,
            },
        ));
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) { self.shutdown_now(); }
}
