//! Pluggable streaming codecs for the compression stage.
//!
//! A [`StreamCodec`] is a shared factory. Each connection obtains its own
//! [`StreamEncoder`] and [`StreamDecoder`] contexts, which carry compression
//! history across calls: frame `n` can only be decoded by a context that has
//! already seen frames `0..n`.
//!
//! Frames leave the encoder in a state where everything fed so far can be
//! reconstructed by the peer, so every frame on the wire is independently
//! decodable given the preceding stream state.
//!
//! # Error Handling
//!
//! Codec failures are reported through [`DecodeError`] and [`EncodeError`].
//! See the [`error`] module for the full taxonomy.

use std::sync::Arc;

use bytes::BytesMut;

mod deflate;
pub mod error;
pub mod frame;

pub use deflate::{DEFAULT_COMPRESSION_LEVEL, DeflateCodec};
pub use error::{DecodeError, EncodeError, EofError};
pub use frame::{LengthPrefixed, MAX_FRAME_LENGTH, MIN_FRAME_LENGTH};

/// Factory for per-connection streaming codec contexts.
pub trait StreamCodec: Send + Sync + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Create a fresh compression context.
    fn new_encoder(&self) -> Box<dyn StreamEncoder>;

    /// Create a fresh decompression context.
    fn new_decoder(&self) -> Box<dyn StreamDecoder>;
}

/// Stateful compression context owned by one connection.
pub trait StreamEncoder: Send + Sync {
    /// Compress `input` and append a complete, flushed block to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Compress`] if the underlying compressor fails.
    fn encode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError>;
}

/// Stateful decompression context owned by one connection.
pub trait StreamDecoder: Send + Sync {
    /// Decompress one flushed block from `input`, appending plaintext to
    /// `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Decompress`] if `input` is not a valid
    /// continuation of the stream seen so far.
    fn decode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), DecodeError>;
}

/// Codec that passes bytes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCodec;

struct Identity;

impl StreamEncoder for Identity {
    fn encode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.extend_from_slice(input);
        Ok(())
    }
}

impl StreamDecoder for Identity {
    fn decode(&mut self, input: &[u8], dst: &mut BytesMut) -> Result<(), DecodeError> {
        dst.extend_from_slice(input);
        Ok(())
    }
}

impl StreamCodec for IdentityCodec {
    fn name(&self) -> &'static str { "identity" }

    fn new_encoder(&self) -> Box<dyn StreamEncoder> { Box::new(Identity) }

    fn new_decoder(&self) -> Box<dyn StreamDecoder> { Box::new(Identity) }
}

/// Selects the codec used by the compression stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecKind {
    /// Raw deflate at the given level (0-9).
    Deflate {
        /// Compression level.
        level: u32,
    },
    /// No compression.
    Identity,
}

impl Default for CodecKind {
    fn default() -> Self {
        Self::Deflate {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CodecKind {
    /// Build the codec described by this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use framechain::codec::CodecKind;
    ///
    /// assert_eq!(CodecKind::default().build().name(), "deflate");
    /// assert_eq!(CodecKind::Identity.build().name(), "identity");
    /// ```
    #[must_use]
    pub fn build(self) -> Arc<dyn StreamCodec> {
        match self {
            Self::Deflate { level } => Arc::new(DeflateCodec::new(level)),
            Self::Identity => Arc::new(IdentityCodec),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CodecKind::Identity)]
    #[case(CodecKind::Deflate { level: 1 })]
    #[case(CodecKind::Deflate { level: 9 })]
    fn blocks_decode_in_sequence(#[case] kind: CodecKind) {
        let codec = kind.build();
        let mut encoder = codec.new_encoder();
        let mut decoder = codec.new_decoder();
        let messages: [&[u8]; 3] = [b"first block", b"second block", b"first block again"];

        for message in messages {
            let mut block = BytesMut::new();
            encoder.encode(message, &mut block).expect("encode");
            let mut plain = BytesMut::new();
            decoder.decode(&block, &mut plain).expect("decode");
            assert_eq!(&plain[..], message);
        }
    }
}
