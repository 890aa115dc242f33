//! Length-prefixed framing shared by the compression and string filters.
//!
//! A frame is `[4-byte big-endian length][payload]`. Extraction tolerates a
//! buffer split at any byte boundary: it only consumes bytes once a complete
//! frame is present.

use bytes::{Buf, Bytes, BytesMut};

use super::{DecodeError, EncodeError};
use crate::byte_order::{LENGTH_PREFIX_SIZE, peek_length_prefix, write_network_u32};

/// Minimum frame length in bytes.
///
/// Frame limits passed to [`LengthPrefixed::new`] are clamped to at least
/// this value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame limits passed to [`LengthPrefixed::new`] are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Length-prefixed frame processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthPrefixed {
    max_frame_length: usize,
    allow_empty: bool,
}

impl LengthPrefixed {
    /// Create a processor rejecting frames larger than `max_frame_length`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
            allow_empty: false,
        }
    }

    /// Accept zero-length frames instead of rejecting them.
    #[must_use]
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Maximum payload length accepted by this processor.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Remove the next complete frame payload from `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched while the frame is
    /// incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::OversizedFrame`] when the prefix announces more
    /// than the maximum, or [`DecodeError::EmptyFrame`] for a zero-length
    /// frame unless empty frames are allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use framechain::codec::LengthPrefixed;
    ///
    /// let processor = LengthPrefixed::new(1024);
    /// let mut src = BytesMut::from(&[0, 0, 0, 2, b'h'][..]);
    /// assert!(processor.decode(&mut src).unwrap().is_none());
    /// src.extend_from_slice(b"i");
    /// assert_eq!(&processor.decode(&mut src).unwrap().unwrap()[..], b"hi");
    /// assert!(src.is_empty());
    /// ```
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Bytes>, DecodeError> {
        let Some(len) = self.check_header(src)? else {
            return Ok(None);
        };
        if src.len() - LENGTH_PREFIX_SIZE < len {
            return Ok(None);
        }
        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }

    /// Returns `true` if `src` starts with a complete frame.
    ///
    /// A malformed header counts as complete so the caller surfaces the error
    /// on its next [`decode`](Self::decode).
    #[must_use]
    pub fn has_frame(&self, src: &[u8]) -> bool {
        match self.check_header(src) {
            Ok(Some(len)) => src.len() - LENGTH_PREFIX_SIZE >= len,
            Ok(None) => false,
            Err(_) => true,
        }
    }

    /// Append `payload` to `dst` behind its length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::OversizedFrame`] when the payload exceeds the
    /// maximum frame length.
    pub fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError> {
        let oversized = || EncodeError::OversizedFrame {
            size: payload.len(),
            max: self.max_frame_length,
        };
        if payload.len() > self.max_frame_length {
            return Err(oversized());
        }
        let len = u32::try_from(payload.len()).map_err(|_| oversized())?;
        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.extend_from_slice(&write_network_u32(len));
        dst.extend_from_slice(payload);
        Ok(())
    }

    fn check_header(&self, src: &[u8]) -> Result<Option<usize>, DecodeError> {
        let Some(len) = peek_length_prefix(src) else {
            return Ok(None);
        };
        if len > self.max_frame_length {
            return Err(DecodeError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            });
        }
        if len == 0 && !self.allow_empty {
            return Err(DecodeError::EmptyFrame);
        }
        Ok(Some(len))
    }
}

impl Default for LengthPrefixed {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}
