//! Dispatch of connection events through a [`FilterChain`].
//!
//! Inbound passes (`connect`, `read`) start at index 0, the transport end;
//! outbound passes start at the last filter and finish by handing bytes to
//! the connection's writer. Within a pass the engine interprets each
//! [`NextAction`]:
//!
//! - `Continue` moves to the adjacent filter in the pass direction.
//! - `Stop` ends the current branch.
//! - `Rerun` moves on like `Continue` and remembers the filter together with
//!   its remainder; when the branch ends the most recent remembered filter
//!   runs again.
//! - `Suspend` waits on the [`ResumeHandle`](crate::filter::ResumeHandle)
//!   and then continues at the adjacent filter, or abandons the pass if the
//!   handle is dropped or the connection starts closing.
//!
//! Writes queued through [`FilterChainContext::write`] run as their own
//! outbound pass, starting below the filter that queued them, before the
//! interrupted pass resumes.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::FilterChain;
use crate::{
    connection::Connection,
    filter::{
        Filter,
        FilterChainContext,
        FilterError,
        Message,
        NextAction,
        context::Resume,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    Connect,
    Read,
    Write,
}

impl Event {
    fn label(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    fn invoke(
        self,
        filter: &dyn Filter,
        ctx: &mut FilterChainContext,
    ) -> Result<NextAction, FilterError> {
        match self {
            Self::Connect => filter.handle_connect(ctx),
            Self::Read => filter.handle_read(ctx),
            Self::Write => filter.handle_write(ctx),
        }
    }

    /// Index of the filter after `index` in this event's direction.
    fn step(self, index: usize, len: usize) -> Option<usize> {
        match self {
            Self::Write => index.checked_sub(1),
            Self::Connect | Self::Read => Some(index + 1).filter(|next| *next < len),
        }
    }
}

/// Drives connection events through a chain.
#[derive(Clone, Debug)]
pub struct FilterChainEngine {
    chain: FilterChain,
}

impl FilterChainEngine {
    /// Create an engine for `chain`.
    #[must_use]
    pub fn new(chain: FilterChain) -> Self { Self { chain } }

    /// The chain this engine drives.
    #[must_use]
    pub fn chain(&self) -> &FilterChain { &self.chain }

    /// Run the connect pass.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter.
    pub async fn dispatch_connect(&self, connection: &Connection) -> Result<(), FilterError> {
        self.run(connection, Event::Connect, self.head(), Message::Empty)
            .await
    }

    /// Run a read pass for `bytes` received from the socket.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter.
    pub async fn dispatch_read(
        &self,
        connection: &Connection,
        bytes: Bytes,
    ) -> Result<(), FilterError> {
        self.run(connection, Event::Read, self.head(), Message::Bytes(bytes))
            .await
    }

    /// Run a write pass for `message`, starting at the application end.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter, or a
    /// [`FilterError::Transport`] if the connection refuses the bytes.
    pub async fn dispatch_write(
        &self,
        connection: &Connection,
        message: impl Into<Message>,
    ) -> Result<(), FilterError> {
        self.run(
            connection,
            Event::Write,
            self.chain.len().checked_sub(1),
            message.into(),
        )
        .await
    }

    /// Run the close pass on every filter and collect their failures.
    pub fn dispatch_close(&self, connection: &Connection) -> Vec<FilterError> {
        self.chain
            .iter()
            .filter_map(|filter| {
                let mut ctx = FilterChainContext::new(connection.clone(), Message::Empty);
                filter.handle_close(&mut ctx).err()
            })
            .collect()
    }

    /// Report `error` to every filter.
    pub fn dispatch_error(&self, connection: &Connection, error: &Arc<FilterError>) {
        for filter in self.chain.iter() {
            let mut ctx = FilterChainContext::new(connection.clone(), Message::Empty);
            filter.exception_occurred(&mut ctx, error);
        }
    }

    fn head(&self) -> Option<usize> { (!self.chain.is_empty()).then_some(0) }

    fn run<'a>(
        &'a self,
        connection: &'a Connection,
        event: Event,
        start: Option<usize>,
        message: Message,
    ) -> BoxFuture<'a, Result<(), FilterError>> {
        async move {
            let mut ctx = FilterChainContext::new(connection.clone(), message);
            let Some(start) = start else {
                if event == Event::Write {
                    deliver(connection, ctx.take_message())?;
                }
                return Ok(());
            };

            let mut reruns: Vec<(usize, Message)> = Vec::new();
            let mut position = Some(start);
            loop {
                let index = match position {
                    Some(index) => index,
                    None => match reruns.pop() {
                        Some((index, remainder)) => {
                            ctx.set_message(remainder);
                            index
                        }
                        None => return Ok(()),
                    },
                };
                let Some(filter) = self.chain.get(index) else {
                    return Ok(());
                };

                let action = event.invoke(filter.as_ref(), &mut ctx)?;
                trace!(
                    connection_id = %connection.id(),
                    filter = filter.name(),
                    event = event.label(),
                    ?action,
                    "filter returned"
                );
                let suspension = ctx.take_suspension();
                for write in ctx.take_writes() {
                    self.run(connection, Event::Write, index.checked_sub(1), write)
                        .await?;
                }

                position = match action {
                    NextAction::Continue => {
                        ctx.clear_remainder();
                        self.advance(connection, event, index, &mut ctx)?
                    }
                    NextAction::Rerun => {
                        reruns.push((index, ctx.take_remainder()));
                        self.advance(connection, event, index, &mut ctx)?
                    }
                    NextAction::Stop => {
                        ctx.clear_remainder();
                        None
                    }
                    NextAction::Suspend => {
                        ctx.clear_remainder();
                        let resume = suspension.ok_or(FilterError::SuspendWithoutHandle {
                            filter: filter.name(),
                        })?;
                        match wait_resume(connection, resume).await {
                            Some(Some(replacement)) => ctx.set_message(replacement),
                            Some(None) => {}
                            None => {
                                debug!(
                                    connection_id = %connection.id(),
                                    filter = filter.name(),
                                    event = event.label(),
                                    "suspended pass abandoned"
                                );
                                return Ok(());
                            }
                        }
                        self.advance(connection, event, index, &mut ctx)?
                    }
                };
            }
        }
        .boxed()
    }

    /// Move past `index`; an outbound pass leaving the chain delivers its
    /// message to the connection.
    fn advance(
        &self,
        connection: &Connection,
        event: Event,
        index: usize,
        ctx: &mut FilterChainContext,
    ) -> Result<Option<usize>, FilterError> {
        let next = event.step(index, self.chain.len());
        if next.is_none() && event == Event::Write {
            deliver(connection, ctx.take_message())?;
        }
        Ok(next)
    }
}

fn deliver(connection: &Connection, message: Message) -> Result<(), FilterError> {
    match message {
        Message::Empty => Ok(()),
        Message::Bytes(bytes) => Ok(connection.enqueue(bytes)?),
        Message::Text(_) => Err(FilterError::unexpected("connection", "bytes", &message)),
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn wait_resume(
    connection: &Connection,
    resume: oneshot::Receiver<Resume>,
) -> Option<Resume> {
    tokio::select! {
        biased;

        () = connection.closing() => None,
        resumed = resume => resumed.ok(),
    }
}
