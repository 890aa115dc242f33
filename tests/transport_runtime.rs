//! Transport lifecycle: binding, accepting, connecting and shutting down.

use std::time::Duration;

use framechain::{
    completion::{CompletionError, CompletionFuture},
    connection::ConnectionState,
    stack::StackOptions,
    transport::{TcpConnector, TcpTransport, TransportConfig, TransportError},
};
use framechain_testing::{SCENARIO_TIMEOUT, start_echo_server};
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[fixture]
fn options() -> StackOptions { StackOptions::default() }

#[rstest]
#[tokio::test]
async fn connection_reports_addresses_and_state(options: StackOptions) {
    let (server, addr) = start_echo_server(options, TransportConfig::default()).expect("start");
    let outcome = CompletionFuture::new();
    let connector = TcpConnector::new(options.client_chain(["state"], outcome.clone()));
    let connection = connector
        .connect(addr)
        .wait_timeout(SCENARIO_TIMEOUT)
        .await
        .expect("connected");
    assert_eq!(connection.peer_addr(), Some(addr));
    assert!(connection.local_addr().is_some());
    outcome.wait_timeout(SCENARIO_TIMEOUT).await.expect("echo");
    assert!(connection.is_open());

    connection
        .close()
        .wait_timeout(SCENARIO_TIMEOUT)
        .await
        .expect("closed");
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(matches!(connection.write("late"), Err(TransportError::Closed)));

    connector.shutdown().await;
    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn server_shutdown_closes_open_connections(options: StackOptions) {
    let (server, addr) = start_echo_server(options, TransportConfig::default()).expect("start");
    let mut raw = TcpStream::connect(addr).await.expect("connect");
    // Partial frame header: the server keeps the connection open waiting for more.
    raw.write_all(&[0, 0]).await.expect("write");

    tokio::time::timeout(SCENARIO_TIMEOUT, server.shutdown())
        .await
        .expect("shutdown completes");
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), raw.read_to_end(&mut rest))
        .await
        .expect("server side closed")
        .expect("clean EOF");
    assert!(rest.is_empty());
}

#[rstest]
#[tokio::test]
async fn corrupt_frame_terminates_the_connection(options: StackOptions) {
    let (server, addr) = start_echo_server(options, TransportConfig::default()).expect("start");
    let mut raw = TcpStream::connect(addr).await.expect("connect");
    raw.write_all(&[0, 0, 0, 4, 0xff, 0xff, 0xff, 0xff])
        .await
        .expect("write corrupt frame");
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), raw.read_to_end(&mut rest))
        .await
        .expect("server closed the connection")
        .expect("clean EOF");
    assert!(rest.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn connect_times_out_against_silent_listener() {
    // Non-routable: depending on the host the attempt hangs or is refused.
    let config = TransportConfig {
        connect_timeout: Duration::from_millis(50),
        ..TransportConfig::default()
    };
    let connector = TcpConnector::with_config(
        StackOptions::default().client_chain(["unused"], CompletionFuture::new()),
        config,
    );
    let err = connector
        .connect(([10, 255, 255, 1], 9).into())
        .wait_timeout(SCENARIO_TIMEOUT)
        .await
        .expect_err("no route");
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::ConnectTimeout(_) | TransportError::Connect(_))
    ));
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = occupied.local_addr().expect("addr");
    let mut transport = TcpTransport::new(StackOptions::default().server_chain());
    assert!(matches!(transport.bind(addr), Err(TransportError::Bind(_))));
}

#[tokio::test]
async fn listeners_bound_after_start_accept_too() {
    let options = StackOptions::default();
    let mut transport = TcpTransport::new(options.server_chain());
    transport.bind(([127, 0, 0, 1], 0).into()).expect("first bind");
    transport.start().expect("start");
    let late = transport.bind(([127, 0, 0, 1], 0).into()).expect("second bind");
    assert_eq!(transport.local_addrs().len(), 2);

    framechain_testing::run_echo_client(late, options, TransportConfig::default(), ["late"])
        .await
        .expect("late listener echoes");
    transport.shutdown().await;
}

#[tokio::test]
async fn connector_shutdown_fails_pending_scenarios() {
    let (server, addr) =
        start_echo_server(StackOptions::default(), TransportConfig::default()).expect("start");
    let outcome = CompletionFuture::new();
    let connector = TcpConnector::new(
        StackOptions {
            read_delay: Duration::from_secs(60),
            ..StackOptions::default()
        }
        .client_chain(["slow"], outcome.clone()),
    );
    connector
        .connect(addr)
        .wait_timeout(SCENARIO_TIMEOUT)
        .await
        .expect("connected");
    connector.shutdown().await;
    assert!(matches!(
        outcome.try_get(),
        Some(Err(CompletionError::Closed))
    ));
    server.shutdown().await;
}
