//! Outbound connections.

use std::{net::SocketAddr, sync::Arc};

use tokio::{net::TcpStream, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use super::{TransportConfig, TransportError};
use crate::{
    buffer::BufferAllocator,
    chain::FilterChain,
    completion::{CompletionError, CompletionFuture},
    connection::Connection,
};

/// Establishes outbound TCP connections running a fixed chain.
///
/// Connections created by a connector are closed by its
/// [`shutdown`](Self::shutdown).
pub struct TcpConnector {
    chain: FilterChain,
    config: TransportConfig,
    allocator: Arc<dyn BufferAllocator>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TcpConnector {
    /// Create a connector with the default configuration.
    #[must_use]
    pub fn new(chain: FilterChain) -> Self { Self::with_config(chain, TransportConfig::default()) }

    /// Create a connector with `config`.
    #[must_use]
    pub fn with_config(chain: FilterChain, config: TransportConfig) -> Self {
        Self {
            allocator: config.build_allocator(),
            chain,
            config,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Connect to `addr`.
    ///
    /// The returned future resolves with the connection once the socket is
    /// established and its actor is running. It fails with
    /// [`TransportError::Connect`] or [`TransportError::ConnectTimeout`]
    /// (wrapped in [`CompletionError::Failed`]), or with
    /// [`CompletionError::Closed`] if the connector shuts down first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, addr: SocketAddr) -> CompletionFuture<Connection> {
        let outcome = CompletionFuture::new();
        if self.token.is_cancelled() {
            outcome.fail_closed();
            return outcome;
        }
        let producer = outcome.clone();
        let chain = self.chain.clone();
        let config = self.config;
        let options = config
            .connection_options(&self.allocator)
            .shutdown_token(self.token.clone())
            .tracked(self.tracker.clone());
        let token = self.token.clone();
        self.tracker.spawn(async move {
            let attempt = timeout(config.connect_timeout, TcpStream::connect(addr));
            let stream = tokio::select! {
                biased;

                () = token.cancelled() => {
                    producer.fail_closed();
                    return;
                }
                res = attempt => match res {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        warn!(%addr, error = %e, "connect failed");
                        producer.failure(CompletionError::failed(TransportError::Connect(e)));
                        return;
                    }
                    Err(_) => {
                        warn!(%addr, timeout = ?config.connect_timeout, "connect timed out");
                        producer.failure(CompletionError::failed(TransportError::ConnectTimeout(
                            config.connect_timeout,
                        )));
                        return;
                    }
                },
            };
            if config.nodelay
                && let Err(e) = stream.set_nodelay(true)
            {
                debug!(%addr, error = %e, "set_nodelay failed");
            }
            let local_addr = stream.local_addr().ok();
            let connection = Connection::spawn(
                stream,
                chain,
                options.addrs(local_addr, Some(addr)),
            );
            debug!(connection_id = %connection.id(), peer_addr = %addr, "connected");
            producer.result(connection);
        });
        outcome
    }

    /// Close every connection created by this connector without waiting.
    pub fn shutdown_now(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    /// Close every connection created by this connector and wait for their
    /// tasks.
    pub async fn shutdown(&self) {
        self.shutdown_now();
        self.tracker.wait().await;
    }
}

impl Drop for TcpConnector {
    fn drop(&mut self) { self.shutdown_now(); }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector")
            .field("chain", &self.chain)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
