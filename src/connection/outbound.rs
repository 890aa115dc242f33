//! Outbound queue and the writer task draining it.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::TransportError;

/// Unit of work for the writer task.
#[derive(Debug)]
pub(crate) enum WriteItem {
    /// Bytes to write to the socket.
    Data(Bytes),
    /// Flush and shut the write half down.
    Shutdown,
}

/// Sending side of a connection's outbound queue.
pub(crate) struct Outbound {
    tx: mpsc::UnboundedSender<WriteItem>,
    pending: Arc<AtomicUsize>,
    limit: Option<usize>,
    failure: Arc<Mutex<Option<io::Error>>>,
}

impl Outbound {
    /// Create a queue whose items arrive on the returned receiver.
    pub(crate) fn detached(limit: Option<usize>) -> (Self, mpsc::UnboundedReceiver<WriteItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Self {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
            limit,
            failure: Arc::new(Mutex::new(None)),
        };
        (outbound, rx)
    }

    /// Queue `bytes` for the writer.
    ///
    /// A write is refused if it would lift the pending byte count above the
    /// limit, except when nothing is pending.
    pub(crate) fn enqueue(&self, bytes: Bytes) -> Result<(), TransportError> {
        let len = bytes.len();
        if len == 0 {
            return Ok(());
        }
        match self.limit {
            Some(limit) => {
                self.pending
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                        (pending == 0 || pending + len <= limit).then_some(pending + len)
                    })
                    .map_err(|pending| TransportError::PendingLimitExceeded { pending, limit })?;
            }
            None => {
                self.pending.fetch_add(len, Ordering::AcqRel);
            }
        }
        self.tx.send(WriteItem::Data(bytes)).map_err(|_| {
            self.pending.fetch_sub(len, Ordering::AcqRel);
            TransportError::Closed
        })
    }

    pub(crate) fn pending(&self) -> usize { self.pending.load(Ordering::Acquire) }

    /// Ask the writer to finish once everything queued so far is written.
    pub(crate) fn shutdown(&self) { let _ = self.tx.send(WriteItem::Shutdown); }

    /// Take the error that stopped the writer, if any.
    pub(crate) fn take_failure(&self) -> Option<io::Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Spawn the writer task for `writer`.
///
/// A write failure is recorded for [`Outbound::take_failure`] and then
/// cancels `token`, which closes the connection.
pub(super) fn spawn_writer<W>(
    writer: W,
    limit: Option<usize>,
    token: CancellationToken,
) -> (Outbound, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, rx) = Outbound::detached(limit);
    let pending = Arc::clone(&outbound.pending);
    let failure = Arc::clone(&outbound.failure);
    let task = tokio::spawn(run_writer(writer, rx, pending, failure, token));
    (outbound, task)
}

async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<WriteItem>,
    pending: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<io::Error>>>,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let result = async {
        while let Some(item) = rx.recv().await {
            match item {
                WriteItem::Data(bytes) => {
                    let written = writer.write_all(&bytes).await;
                    pending.fetch_sub(bytes.len(), Ordering::AcqRel);
                    written?;
                    if rx.is_empty() {
                        writer.flush().await?;
                    }
                }
                WriteItem::Shutdown => break,
            }
        }
        writer.shutdown().await
    }
    .await;

    if let Err(e) = result {
        debug!(error = %e, "outbound write failed");
        *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
        token.cancel();
    }
}
