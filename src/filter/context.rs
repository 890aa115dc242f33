//! Per-event state handed to filter handlers.

use std::time::Duration;

use tokio::sync::oneshot;

use super::{Message, NextAction};
use crate::connection::{Connection, ConnectionId};

/// Resumption signal: `Some` replaces the current message.
pub(crate) type Resume = Option<Message>;

/// State of one dispatched event.
///
/// The engine creates a fresh context per event and keeps it while the event
/// is suspended. Handlers read and replace the current message, store a
/// remainder for [`NextAction::Rerun`], queue writes and request suspension.
pub struct FilterChainContext {
    connection: Connection,
    message: Message,
    remainder: Option<Message>,
    writes: Vec<Message>,
    suspension: Option<oneshot::Receiver<Resume>>,
}

impl FilterChainContext {
    pub(crate) fn new(connection: Connection, message: Message) -> Self {
        Self {
            connection,
            message,
            remainder: None,
            writes: Vec::new(),
            suspension: None,
        }
    }

    /// The connection this event belongs to.
    #[must_use]
    pub fn connection(&self) -> &Connection { &self.connection }

    /// Shorthand for `self.connection().id()`.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.connection.id() }

    /// The current message.
    #[must_use]
    pub fn message(&self) -> &Message { &self.message }

    /// Take the current message, leaving [`Message::Empty`].
    pub fn take_message(&mut self) -> Message { std::mem::take(&mut self.message) }

    /// Replace the current message.
    pub fn set_message(&mut self, message: impl Into<Message>) { self.message = message.into(); }

    /// Store the message this filter receives when the engine reruns it.
    pub fn set_remainder(&mut self, remainder: impl Into<Message>) {
        self.remainder = Some(remainder.into());
    }

    /// Queue `message` for the outbound pass.
    ///
    /// The write starts at the filter below the caller, toward the transport,
    /// and runs as soon as the current handler returns. Writes queued by one
    /// handler run in order.
    pub fn write(&mut self, message: impl Into<Message>) { self.writes.push(message.into()); }

    /// Request suspension of this event.
    ///
    /// Return [`NextAction::Suspend`] after calling this. The event resumes
    /// at the next filter when the handle fires. Dropping the handle, or the
    /// connection closing, abandons the event.
    pub fn suspend(&mut self) -> ResumeHandle {
        let (tx, rx) = oneshot::channel();
        self.suspension = Some(rx);
        ResumeHandle { tx }
    }

    pub(crate) fn take_remainder(&mut self) -> Message { self.remainder.take().unwrap_or_default() }

    pub(crate) fn take_writes(&mut self) -> Vec<Message> { std::mem::take(&mut self.writes) }

    pub(crate) fn take_suspension(&mut self) -> Option<oneshot::Receiver<Resume>> {
        self.suspension.take()
    }

    pub(crate) fn clear_remainder(&mut self) { self.remainder = None; }
}

impl std::fmt::Debug for FilterChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChainContext")
            .field("connection", &self.connection.id())
            .field("message", &self.message.kind())
            .field("queued_writes", &self.writes.len())
            .field("suspended", &self.suspension.is_some())
            .finish_non_exhaustive()
    }
}

/// Resumes an event suspended through [`FilterChainContext::suspend`].
#[derive(Debug)]
#[must_use = "dropping the handle abandons the suspended event"]
pub struct ResumeHandle {
    tx: oneshot::Sender<Resume>,
}

impl ResumeHandle {
    /// Continue with the current message.
    pub fn resume(self) { let _ = self.tx.send(None); }

    /// Continue with `message` in place of the current message.
    pub fn resume_with(self, message: impl Into<Message>) {
        let _ = self.tx.send(Some(message.into()));
    }

    /// Continue once `delay` has elapsed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn resume_after(self, delay: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            self.resume();
        });
    }
}

/// Convenience used by handlers that pause for a fixed time.
pub(crate) fn suspend_for(ctx: &mut FilterChainContext, delay: Duration) -> NextAction {
    ctx.suspend().resume_after(delay);
    NextAction::Suspend
}
