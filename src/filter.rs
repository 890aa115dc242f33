//! Filters: the processing stages of a [`FilterChain`](crate::chain::FilterChain).
//!
//! A filter reacts to connection events through optional handlers. Inbound
//! events (`connect`, `read`, `close`) travel from the transport stage toward
//! the application; outbound writes travel the other way. Each handler
//! inspects or replaces the message in its [`FilterChainContext`] and tells
//! the engine how to proceed through a [`NextAction`].
//!
//! Filters are shared between connections, so any per-connection state lives
//! in a side table keyed by the connection's
//! [`ConnectionId`](crate::connection::ConnectionId), for example
//! [`ConnectionStates`](crate::filters::ConnectionStates).

use std::sync::Arc;

use bytes::Bytes;

pub mod context;
pub mod error;

pub use context::{FilterChainContext, ResumeHandle};
pub use error::FilterError;

/// Instruction returned by a filter handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextAction {
    /// Pass the current message to the next filter.
    Continue,
    /// End the current branch of the pass.
    Stop,
    /// Pass the current message on, then invoke this filter again with the
    /// context remainder once the downstream branch has finished.
    Rerun,
    /// Pause until the handle from [`FilterChainContext::suspend`] resumes.
    Suspend,
}

/// Payload carried through the chain.
///
/// Its variant depends on the position in the chain: raw and framed bytes
/// near the transport, decoded text near the application.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Message {
    /// No payload.
    #[default]
    Empty,
    /// Binary payload.
    Bytes(Bytes),
    /// Decoded text.
    Text(String),
}

impl Message {
    /// Name of the variant, used in errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
        }
    }

    /// Returns `true` for [`Message::Empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool { matches!(self, Self::Empty) }

    /// Unwrap a binary payload on behalf of `filter`.
    ///
    /// [`Message::Empty`] yields empty bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnexpectedMessage`] for text.
    pub fn into_bytes(self, filter: &'static str) -> Result<Bytes, FilterError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(bytes) => Ok(bytes),
            Self::Text(_) => Err(FilterError::unexpected(filter, "bytes", &self)),
        }
    }

    /// Unwrap a text payload on behalf of `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnexpectedMessage`] for anything but text.
    pub fn into_text(self, filter: &'static str) -> Result<String, FilterError> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(FilterError::unexpected(filter, "text", &other)),
        }
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self { Self::Bytes(value) }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self { Self::Bytes(Bytes::from(value)) }
}

impl From<&'static [u8]> for Message {
    fn from(value: &'static [u8]) -> Self { Self::Bytes(Bytes::from_static(value)) }
}

impl From<String> for Message {
    fn from(value: String) -> Self { Self::Text(value) }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

/// A processing stage reacting to connection events.
///
/// Every handler is optional. The defaults pass the message through
/// unchanged.
///
/// # Examples
///
/// ```
/// use framechain::filter::{Filter, FilterChainContext, FilterError, Message, NextAction};
///
/// struct Upper;
///
/// impl Filter for Upper {
///     fn name(&self) -> &'static str { "upper" }
///
///     fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
///         let text = ctx.take_message().into_text(self.name())?;
///         ctx.set_message(text.to_uppercase());
///         Ok(NextAction::Continue)
///     }
/// }
/// ```
pub trait Filter: Send + Sync + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// The connection became open.
    ///
    /// # Errors
    ///
    /// An error runs the error pass and closes the connection.
    fn handle_connect(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let _ = ctx;
        Ok(NextAction::Continue)
    }

    /// Inbound data reached this filter.
    ///
    /// # Errors
    ///
    /// An error runs the error pass and closes the connection.
    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let _ = ctx;
        Ok(NextAction::Continue)
    }

    /// Outbound data reached this filter.
    ///
    /// # Errors
    ///
    /// An error runs the error pass and closes the connection.
    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let _ = ctx;
        Ok(NextAction::Continue)
    }

    /// The connection is closing.
    ///
    /// Called on every filter regardless of the actions returned.
    ///
    /// # Errors
    ///
    /// Errors are collected and logged; they never replace the error that
    /// caused the close.
    fn handle_close(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let _ = ctx;
        Ok(NextAction::Continue)
    }

    /// A pass on this connection failed with `error`.
    ///
    /// The error is shared so a filter can keep it, for example to fail a
    /// [`CompletionFuture`](crate::completion::CompletionFuture).
    fn exception_occurred(&self, ctx: &mut FilterChainContext, error: &Arc<FilterError>) {
        let _ = (ctx, error);
    }
}
