//! Streaming compression with length-prefixed frames on the wire.

use std::{fmt, sync::Arc};

use bytes::BytesMut;
use tracing::trace;

use super::ConnectionStates;
use crate::{
    codec::{
        CodecKind,
        DecodeError,
        EofError,
        LengthPrefixed,
        MAX_FRAME_LENGTH,
        StreamCodec,
        StreamDecoder,
        StreamEncoder,
    },
    filter::{Filter, FilterChainContext, FilterError, NextAction},
    metrics::{self, Direction},
};

struct CompressionState {
    encoder: Box<dyn StreamEncoder>,
    decoder: Box<dyn StreamDecoder>,
    inbound: BytesMut,
}

/// Compresses outbound payloads and decompresses inbound frames.
///
/// Each connection owns persistent encoder and decoder contexts, created on
/// first use and dropped on close. Outbound, every non-empty payload becomes
/// one `[4-byte big-endian length][compressed block]` frame. Inbound, bytes
/// are accumulated until a complete frame is buffered; frames are then
/// decompressed and forwarded one at a time, in order, whatever the
/// segmentation they arrived in.
pub struct CompressionFilter {
    codec: Arc<dyn StreamCodec>,
    framing: LengthPrefixed,
    states: ConnectionStates<CompressionState>,
}

impl CompressionFilter {
    /// Create a filter using `codec`, accepting frames of up to
    /// [`MAX_FRAME_LENGTH`] bytes.
    #[must_use]
    pub fn new(codec: Arc<dyn StreamCodec>) -> Self {
        Self {
            codec,
            framing: LengthPrefixed::new(MAX_FRAME_LENGTH),
            states: ConnectionStates::new(),
        }
    }

    /// Limit frame payloads to `max_frame_length` bytes.
    ///
    /// The limit is clamped to the range supported by
    /// [`LengthPrefixed::new`].
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.framing = LengthPrefixed::new(max_frame_length);
        self
    }

    /// Number of connections currently holding codec state.
    #[must_use]
    pub fn active_states(&self) -> usize { self.states.len() }

    fn fresh_state(&self) -> CompressionState {
        CompressionState {
            encoder: self.codec.new_encoder(),
            decoder: self.codec.new_decoder(),
            inbound: BytesMut::new(),
        }
    }
}

impl Default for CompressionFilter {
    fn default() -> Self { Self::new(CodecKind::default().build()) }
}

impl fmt::Debug for CompressionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionFilter")
            .field("codec", &self.codec.name())
            .field("max_frame_length", &self.framing.max_frame_length())
            .field("states", &self.states)
            .finish()
    }
}

impl Filter for CompressionFilter {
    fn name(&self) -> &'static str { "compression" }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let incoming = ctx.take_message().into_bytes(self.name())?;
        let id = ctx.connection_id();
        self.states.with(
            id,
            || self.fresh_state(),
            |state| -> Result<NextAction, FilterError> {
                state.inbound.extend_from_slice(&incoming);
                loop {
                    let Some(frame) = self.framing.decode(&mut state.inbound)? else {
                        return Ok(NextAction::Stop);
                    };
                    let mut plain = BytesMut::new();
                    state.decoder.decode(&frame, &mut plain)?;
                    metrics::inc_frames(Direction::Inbound);
                    trace!(
                        connection_id = %id,
                        compressed = frame.len(),
                        plain = plain.len(),
                        "frame decoded"
                    );
                    if plain.is_empty() {
                        continue;
                    }
                    ctx.set_message(plain.freeze());
                    return Ok(if self.framing.has_frame(&state.inbound) {
                        NextAction::Rerun
                    } else {
                        NextAction::Continue
                    });
                }
            },
        )
    }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let payload = ctx.take_message().into_bytes(self.name())?;
        if payload.is_empty() {
            return Ok(NextAction::Stop);
        }
        let id = ctx.connection_id();
        let frame = self.states.with(
            id,
            || self.fresh_state(),
            |state| -> Result<BytesMut, FilterError> {
                let mut compressed = BytesMut::new();
                state.encoder.encode(&payload, &mut compressed)?;
                let mut frame = BytesMut::new();
                self.framing.encode(&compressed, &mut frame)?;
                Ok(frame)
            },
        )?;
        metrics::inc_frames(Direction::Outbound);
        trace!(connection_id = %id, plain = payload.len(), framed = frame.len(), "frame encoded");
        ctx.set_message(frame.freeze());
        Ok(NextAction::Continue)
    }

    fn handle_close(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let leftover = self
            .states
            .remove(ctx.connection_id())
            .and_then(|state| EofError::from_pending(&state.inbound));
        match leftover {
            Some(eof) => Err(DecodeError::Truncated(eof).into()),
            None => Ok(NextAction::Continue),
        }
    }
}
