//! Adversarial re-segmentation of the byte stream.

use std::num::NonZeroUsize;

use crate::filter::{Filter, FilterChainContext, FilterError, Message, NextAction};

/// Splits every byte message, in both directions, into pieces of at most
/// `chunk_size` bytes.
///
/// Content is never altered; only the segmentation seen by the neighbouring
/// filters changes.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingFilter {
    chunk_size: NonZeroUsize,
}

impl ChunkingFilter {
    /// Create a filter emitting pieces of at most `chunk_size` bytes.
    #[must_use]
    pub fn new(chunk_size: NonZeroUsize) -> Self { Self { chunk_size } }

    /// Maximum piece size.
    #[must_use]
    pub fn chunk_size(&self) -> NonZeroUsize { self.chunk_size }

    fn split(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let mut bytes = match ctx.take_message() {
            Message::Empty => return Ok(NextAction::Stop),
            Message::Bytes(bytes) => bytes,
            other => return Err(FilterError::unexpected(self.name(), "bytes", &other)),
        };
        if bytes.len() <= self.chunk_size.get() {
            ctx.set_message(bytes);
            return Ok(NextAction::Continue);
        }
        let rest = bytes.split_off(self.chunk_size.get());
        ctx.set_message(bytes);
        ctx.set_remainder(rest);
        Ok(NextAction::Rerun)
    }
}

impl Filter for ChunkingFilter {
    fn name(&self) -> &'static str { "chunking" }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> { self.split(ctx) }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> { self.split(ctx) }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;
    use crate::{
        chain::{FilterChainBuilder, FilterChainEngine},
        connection::test_support::{detached, drain},
    };

    #[rstest]
    #[case(1, &[&b"h"[..], b"e", b"l", b"l", b"o"])]
    #[case(2, &[&b"he"[..], b"ll", b"o"])]
    #[case(5, &[&b"hello"[..]])]
    #[case(64, &[&b"hello"[..]])]
    #[tokio::test]
    async fn outbound_pieces_preserve_order(#[case] size: usize, #[case] expected: &[&[u8]]) {
        let (conn, mut rx) = detached();
        let chunker = ChunkingFilter::new(NonZeroUsize::new(size).expect("non-zero"));
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(chunker).build());
        engine
            .dispatch_write(&conn, Bytes::from_static(b"hello"))
            .await
            .expect("write pass");
        let pieces = drain(&mut rx);
        let pieces: Vec<&[u8]> = pieces.iter().map(|b| &b[..]).collect();
        assert_eq!(pieces, expected);
    }

    #[tokio::test]
    async fn text_is_rejected() {
        let (conn, _rx) = detached();
        let chunker = ChunkingFilter::new(NonZeroUsize::MIN);
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(chunker).build());
        let err = engine.dispatch_write(&conn, "no").await.expect_err("text");
        assert!(matches!(err, FilterError::UnexpectedMessage { filter: "chunking", .. }));
    }
}
