//! The task owning a connection's read half and running its chain events.

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use log::{error, info};
use tokio::{
    io::{AsyncRead, AsyncReadExt, ReadHalf},
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::{Command, Connection, ConnectionState, counter::ActiveConnection};
use crate::{
    buffer::Buffer,
    chain::{FilterChain, FilterChainEngine},
    completion::CompletionError,
    filter::FilterError,
    transport::TransportError,
};

pub(super) struct ConnectionActor<S> {
    connection: Connection,
    engine: FilterChainEngine,
    reader: ReadHalf<S>,
    commands: mpsc::UnboundedReceiver<Command>,
    writer: JoinHandle<()>,
    buffer: Buffer,
    read_buffer_size: usize,
    drain_timeout: Duration,
}

/// Spawn `actor`, logging and absorbing any panic it raises.
pub(super) fn spawn<S>(actor: ConnectionActor<S>, tracker: Option<&TaskTracker>)
where
    S: AsyncRead + Send + 'static,
{
    let connection = actor.connection.clone();
    let task = async move {
        let fut = std::panic::AssertUnwindSafe(actor.run()).catch_unwind();
        if let Err(panic) = fut.await {
            crate::metrics::inc_connection_panics();
            let panic_msg = crate::panic::format_panic(panic);
            let peer_addr = connection.peer_addr();
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
            connection.token().cancel();
            connection.outbound().shutdown();
            connection.set_state(ConnectionState::Closed);
            connection.closed().failure(CompletionError::failed(format!(
                "connection task panicked: {panic_msg}"
            )));
        }
    };
    match tracker {
        Some(tracker) => drop(tracker.spawn(task)),
        None => drop(tokio::spawn(task)),
    }
}

impl<S> ConnectionActor<S>
where
    S: AsyncRead + Send + 'static,
{
    pub(super) fn new(
        connection: Connection,
        chain: FilterChain,
        reader: ReadHalf<S>,
        commands: mpsc::UnboundedReceiver<Command>,
        writer: JoinHandle<()>,
        buffer: Buffer,
        read_buffer_size: usize,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            engine: FilterChainEngine::new(chain),
            reader,
            commands,
            writer,
            buffer,
            read_buffer_size,
            drain_timeout,
        }
    }

    async fn run(mut self) {
        let guard = ActiveConnection::open();
        let id = self.connection.id();
        info!(
            "connection opened: framechain_active_connections={}, id={id}, peer={:?}",
            guard.running_at_open(),
            self.connection.peer_addr()
        );
        self.connection.set_state(ConnectionState::Open);

        let outcome = self.serve().await;
        self.teardown(outcome).await;

        info!("connection closed: id={id}");
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn serve(&mut self) -> Result<(), FilterError> {
        self.engine.dispatch_connect(&self.connection).await?;
        loop {
            self.buffer.reserve(self.read_buffer_size);
            select! {
                biased;

                () = self.connection.token().cancelled() => return Ok(()),
                command = self.commands.recv() => match command {
                    Some(Command::Write(message)) => {
                        self.engine.dispatch_write(&self.connection, message).await?;
                    }
                    None => return Ok(()),
                },
                read = self.reader.read_buf(self.buffer.bytes_mut()) => match read {
                    Ok(0) => {
                        debug!(connection_id = %self.connection.id(), "peer closed connection");
                        return Ok(());
                    }
                    Ok(n) => {
                        let bytes = self.buffer.split_filled();
                        debug_assert_eq!(bytes.len(), n, "buffer holds exactly the bytes read");
                        self.engine.dispatch_read(&self.connection, bytes).await?;
                    }
                    Err(e) => return Err(TransportError::Io(e).into()),
                },
            }
        }
    }

    async fn teardown(self, outcome: Result<(), FilterError>) {
        let Self {
            connection,
            engine,
            commands,
            mut writer,
            buffer,
            drain_timeout,
            ..
        } = self;
        let id = connection.id();
        let silent = connection.is_silent();

        // A failed socket write ends `serve` through the cancelled token or a
        // refused enqueue; surface the write error in place of either.
        let outcome = match outcome {
            Err(err) if err.should_disconnect() => Err(err),
            other => connection
                .outbound()
                .take_failure()
                .map_or(other, |e| Err(TransportError::Io(e).into())),
        };

        if let Err(err) = outcome
            && err.should_disconnect()
        {
            let err = Arc::new(err);
            crate::metrics::inc_errors();
            if silent {
                debug!(connection_id = %id, error = %err, "connection failed");
            } else {
                warn!(connection_id = %id, error = %err, "connection failed");
            }
            engine.dispatch_error(&connection, &err);
        }

        connection.set_state(ConnectionState::Closing);
        // Abandons suspended passes.
        connection.token().cancel();
        drop(commands);

        for failure in engine.dispatch_close(&connection) {
            if silent {
                debug!(connection_id = %id, error = %failure, "close pass failure");
            } else {
                warn!(connection_id = %id, error = %failure, "close pass failure");
            }
        }

        connection.outbound().shutdown();
        match tokio::time::timeout(drain_timeout, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(connection_id = %id, error = %e, "writer task ended abnormally"),
            Err(_) => {
                writer.abort();
                let pending = connection.pending_bytes();
                if silent {
                    debug!(connection_id = %id, pending, "outbound drain timed out");
                } else {
                    warn!(connection_id = %id, pending, "outbound drain timed out");
                }
            }
        }
        buffer.release();

        connection.set_state(ConnectionState::Closed);
        connection.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        chain::FilterChainBuilder,
        connection::{ConnectionOptions, test_support::BrokenPipe},
        filter::{FilterChainContext, NextAction},
        filters::{EchoFilter, StringFilter, TransportFilter},
    };

    const WAIT: Duration = Duration::from_secs(5);

    struct Exploding;

    impl crate::filter::Filter for Exploding {
        fn name(&self) -> &'static str { "exploding" }

        fn handle_read(&self, _ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
            panic!("filter exploded")
        }
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn echoes_and_closes_on_peer_eof() {
        let (stream, mut peer) = duplex(64);
        let chain = FilterChainBuilder::new()
            .add(TransportFilter)
            .add(EchoFilter)
            .build();
        let conn = Connection::spawn(stream, chain, ConnectionOptions::default());

        peer.write_all(b"ping").await.expect("write");
        let mut echoed = [0; 4];
        peer.read_exact(&mut echoed).await.expect("read echo");
        assert_eq!(&echoed, b"ping");

        peer.shutdown().await.expect("shutdown");
        conn.closed().wait_timeout(WAIT).await.expect("closed");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(logs_contain("peer closed connection"));
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn decode_failure_is_logged_and_closes() {
        let (stream, mut peer) = duplex(64);
        let chain = FilterChainBuilder::new()
            .add(TransportFilter)
            .add(StringFilter::default())
            .build();
        let conn = Connection::spawn(stream, chain, ConnectionOptions::default());

        peer.write_all(&[0xff; 4]).await.expect("write");
        conn.closed().wait_timeout(WAIT).await.expect("closed");
        assert!(logs_contain("connection failed"));
        assert!(logs_contain("frame exceeds max length"));

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.expect("peer sees EOF");
        assert!(rest.is_empty());
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn silent_close_keeps_close_failures_at_debug() {
        let (stream, mut peer) = duplex(64);
        let chain = FilterChainBuilder::new()
            .add(TransportFilter)
            .add(StringFilter::default())
            .build();
        let conn = Connection::spawn(stream, chain, ConnectionOptions::default());

        peer.write_all(&[0, 0]).await.expect("write partial header");
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close_silently().wait_timeout(WAIT).await.expect("closed");
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .find(|line| line.contains("close pass failure"))
            {
                Some(line) if line.contains("DEBUG") => Ok(()),
                Some(line) => Err(format!("unexpected level: {line}")),
                None => Err("close failure was not logged".to_owned()),
            }
        });
    }

    #[derive(Default)]
    struct Errors(std::sync::Mutex<Vec<Arc<FilterError>>>);

    impl crate::filter::Filter for Errors {
        fn name(&self) -> &'static str { "errors" }

        fn exception_occurred(&self, _ctx: &mut FilterChainContext, error: &Arc<FilterError>) {
            self.0.lock().expect("errors lock").push(Arc::clone(error));
        }
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn socket_write_failure_runs_error_pass() {
        let errors = Arc::new(Errors::default());
        let chain = FilterChainBuilder::new()
            .add(TransportFilter)
            .add_shared(errors.clone())
            .build();
        let conn = Connection::spawn(BrokenPipe, chain, ConnectionOptions::default());

        conn.write(bytes::Bytes::from_static(b"lost"))
            .expect("connection accepts the write");
        conn.closed().wait_timeout(WAIT).await.expect("closed");

        let errors = errors.0.lock().expect("errors lock");
        assert!(matches!(
            errors.as_slice(),
            [err] if matches!(
                &**err,
                FilterError::Transport(TransportError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe
            )
        ));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(logs_contain("connection failed"));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn close_completes_when_peer_stops_reading() {
        let (stream, _peer) = duplex(64);
        let chain = FilterChainBuilder::new().add(TransportFilter).build();
        let options = ConnectionOptions::default().drain_timeout(Duration::from_millis(200));
        let conn = Connection::spawn(stream, chain, options);

        conn.enqueue(bytes::Bytes::from(vec![7; 4096]))
            .expect("queued");
        conn.close()
            .wait_timeout(Duration::from_secs(2))
            .await
            .expect("close resolves despite unread bytes");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(logs_contain("outbound drain timed out"));
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn panicking_filter_fails_closed_future() {
        let (stream, mut peer) = duplex(64);
        let chain = FilterChainBuilder::new().add(Exploding).build();
        let conn = Connection::spawn(stream, chain, ConnectionOptions::default());

        peer.write_all(b"x").await.expect("write");
        let err = conn
            .closed()
            .wait_timeout(WAIT)
            .await
            .expect_err("task panicked");
        assert!(err.to_string().contains("filter exploded"));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(logs_contain("connection task panicked"));
    }
}
