//! Echo scenarios over loopback sockets and in-memory pipes.

use std::{net::SocketAddr, time::Duration};

use framechain::{
    buffer::{AllocatorKind, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY},
    completion::{CompletionError, CompletionFuture},
    connection::{Connection, ConnectionOptions},
    stack::StackOptions,
    transport::{TcpConnector, TcpTransport, TransportConfig, TransportError},
};

/// Upper bound on how long a scenario may take before it counts as hung.
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(30);

/// Start the reference echo server on an ephemeral loopback port.
///
/// # Errors
///
/// Returns a [`TransportError`] if binding or starting fails.
pub fn start_echo_server(
    options: StackOptions,
    config: TransportConfig,
) -> Result<(TcpTransport, SocketAddr), TransportError> {
    let mut transport = TcpTransport::with_config(options.server_chain(), config);
    let addr = transport.bind(([127, 0, 0, 1], 0).into())?;
    transport.start()?;
    Ok((transport, addr))
}

/// Connect a verifying client to `addr`, send `messages` and wait for every
/// echo.
///
/// # Errors
///
/// Returns the [`CompletionError`] that failed the connect or the echo
/// verification.
pub async fn run_echo_client<I, M>(
    addr: SocketAddr,
    options: StackOptions,
    config: TransportConfig,
    messages: I,
) -> Result<(), CompletionError>
where
    I: IntoIterator<Item = M>,
    M: Into<String>,
{
    let outcome = CompletionFuture::new();
    let connector = TcpConnector::with_config(options.client_chain(messages, outcome.clone()), config);
    let connection = connector.connect(addr).wait_timeout(SCENARIO_TIMEOUT).await?;
    let verified = outcome.wait_timeout(SCENARIO_TIMEOUT).await;
    let _ = connection.close().wait_timeout(SCENARIO_TIMEOUT).await;
    connector.shutdown().await;
    verified
}

/// Run a client and server stack against each other over an in-memory pipe,
/// allocating read buffers with `allocator`.
///
/// # Errors
///
/// Returns the [`CompletionError`] that failed the echo verification.
pub async fn duplex_echo<I, M>(
    options: StackOptions,
    allocator: AllocatorKind,
    messages: I,
) -> Result<(), CompletionError>
where
    I: IntoIterator<Item = M>,
    M: Into<String>,
{
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let connection_options = ConnectionOptions::default()
        .allocator(allocator.build(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY));
    let outcome = CompletionFuture::new();
    let server = Connection::spawn(server_io, options.server_chain(), connection_options.clone());
    let client = Connection::spawn(
        client_io,
        options.client_chain(messages, outcome.clone()),
        connection_options,
    );
    let verified = outcome.wait_timeout(SCENARIO_TIMEOUT).await;
    let _ = client.close().wait_timeout(SCENARIO_TIMEOUT).await;
    let _ = server.closed().wait_timeout(SCENARIO_TIMEOUT).await;
    verified
}
