//! Accept loop spawning a connection actor per accepted socket.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::BackoffConfig;
use crate::{
    chain::FilterChain,
    connection::{Connection, ConnectionOptions},
};

/// Source of incoming connections consumed by [`accept_loop`].
///
/// Dropping a pending `accept()` future must not leak resources.
#[async_trait]
pub(super) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Clone, Debug)]
pub(super) struct AcceptLoopOptions {
    pub chain: FilterChain,
    pub connection: ConnectionOptions,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
    pub nodelay: bool,
}

/// Accept connections from `listener` until `options.shutdown` is
/// cancelled.
///
/// Each accepted socket gets its own connection actor, tracked by
/// `options.tracker` and closed when the shutdown token is cancelled. Accept
/// failures are logged and retried after an exponential back-off.
pub(super) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let backoff = options.backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next) = accept_iteration(listener.as_ref(), &options, &backoff, delay).await {
        delay = next;
    }
    debug!(
        "accept loop stopped: local_addr={:?}",
        listener.local_addr().ok()
    );
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L: AcceptListener>(
    listener: &L,
    options: &AcceptLoopOptions,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration> {
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer_addr)) => {
                spawn_connection(stream, peer_addr, options);
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                select! {
                    biased;

                    () = options.shutdown.cancelled() => return None,
                    () = sleep(delay) => {}
                }
                backoff.next_delay(delay)
            }
        }),
    }
}

fn spawn_connection(stream: TcpStream, peer_addr: SocketAddr, options: &AcceptLoopOptions) {
    if options.nodelay
        && let Err(e) = stream.set_nodelay(true)
    {
        debug!("set_nodelay failed: error={e:?}, peer_addr={peer_addr}");
    }
    let local_addr = stream.local_addr().ok();
    let connection = Connection::spawn(
        stream,
        options.chain.clone(),
        options
            .connection
            .clone()
            .shutdown_token(options.shutdown.clone())
            .tracked(options.tracker.clone())
            .addrs(local_addr, Some(peer_addr)),
    );
    debug!(
        "connection accepted: id={}, peer_addr={peer_addr}",
        connection.id()
    );
}
