//! Client-side stage verifying that every message comes back unchanged.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::ConnectionStates;
use crate::{
    completion::{CompletionError, CompletionFuture},
    filter::{Filter, FilterChainContext, FilterError, NextAction},
};

/// An echoed message differed from the one sent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("echo {index} mismatch: expected {expected:?}, received {received:?}")]
pub struct EchoMismatch {
    /// Position of the message in the expected sequence.
    pub index: usize,
    /// Message that was sent.
    pub expected: String,
    /// Message that came back.
    pub received: String,
}

/// Sends a fixed list of messages one at a time, checking each echo before
/// sending the next.
///
/// The outcome future resolves once the last echo matches. It fails with
/// [`EchoMismatch`] on the first difference, with the chain error when the
/// connection fails, and with [`CompletionError::Closed`] when the
/// connection closes first.
#[derive(Debug)]
pub struct EchoCheckFilter {
    expected: Arc<[String]>,
    outcome: CompletionFuture<()>,
    progress: ConnectionStates<usize>,
}

impl EchoCheckFilter {
    /// Create a stage expecting `messages` back in order, reporting to
    /// `outcome`.
    pub fn new<I, M>(messages: I, outcome: CompletionFuture<()>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            expected: messages.into_iter().map(Into::into).collect(),
            outcome,
            progress: ConnectionStates::new(),
        }
    }

    /// The future resolved by this filter.
    #[must_use]
    pub fn outcome(&self) -> &CompletionFuture<()> { &self.outcome }

    fn send(&self, ctx: &mut FilterChainContext, index: usize) {
        if let Some(message) = self.expected.get(index) {
            self.progress.insert(ctx.connection_id(), index);
            ctx.write(message.clone());
        }
    }
}

impl Filter for EchoCheckFilter {
    fn name(&self) -> &'static str { "echo-check" }

    fn handle_connect(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        if self.expected.is_empty() {
            self.outcome.result(());
        } else {
            self.send(ctx, 0);
        }
        Ok(NextAction::Stop)
    }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let received = ctx.take_message().into_text(self.name())?;
        let Some(index) = self.progress.get(ctx.connection_id()) else {
            debug!(connection_id = %ctx.connection_id(), "echo received with nothing outstanding");
            return Ok(NextAction::Stop);
        };
        let Some(expected) = self.expected.get(index) else {
            return Ok(NextAction::Stop);
        };
        if *expected != received {
            self.progress.remove(ctx.connection_id());
            self.outcome.failure(CompletionError::failed(EchoMismatch {
                index,
                expected: expected.clone(),
                received,
            }));
        } else if index + 1 == self.expected.len() {
            self.progress.remove(ctx.connection_id());
            self.outcome.result(());
        } else {
            self.send(ctx, index + 1);
        }
        Ok(NextAction::Stop)
    }

    fn handle_close(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        self.progress.remove(ctx.connection_id());
        self.outcome.fail_closed();
        Ok(NextAction::Continue)
    }

    fn exception_occurred(&self, _ctx: &mut FilterChainContext, error: &Arc<FilterError>) {
        let cause: Arc<dyn std::error::Error + Send + Sync> = error.clone();
        self.outcome.failure(CompletionError::Failed(cause));
    }
}
