//! Error types for the codec layer.
//!
//! The taxonomy distinguishes failures turning wire bytes back into messages
//! ([`DecodeError`]) from failures producing wire bytes ([`EncodeError`]).
//! End-of-stream conditions with a partially buffered frame are described by
//! [`EofError`] so logs can tell a truncated header from a truncated payload.

use std::string::FromUtf8Error;

use thiserror::Error;

use crate::byte_order::LENGTH_PREFIX_SIZE;

/// EOF received while a frame was only partially buffered.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The stream ended inside the length prefix.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// The stream ended after the length prefix but before the payload
    /// completed.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload size announced by the length prefix.
        expected: usize,
    },
}

impl EofError {
    /// Describe the partial frame left in `pending`, or `None` if nothing is
    /// buffered.
    ///
    /// # Examples
    ///
    /// ```
    /// use framechain::codec::EofError;
    ///
    /// assert_eq!(EofError::from_pending(&[]), None);
    /// assert_eq!(
    ///     EofError::from_pending(&[0, 0]),
    ///     Some(EofError::MidHeader {
    ///         bytes_received: 2,
    ///         header_size: 4
    ///     })
    /// );
    /// assert_eq!(
    ///     EofError::from_pending(&[0, 0, 0, 9, 1]),
    ///     Some(EofError::MidFrame {
    ///         bytes_received: 1,
    ///         expected: 9
    ///     })
    /// );
    /// ```
    #[must_use]
    pub fn from_pending(pending: &[u8]) -> Option<Self> {
        if pending.is_empty() {
            return None;
        }
        match crate::byte_order::peek_length_prefix(pending) {
            None => Some(Self::MidHeader {
                bytes_received: pending.len(),
                header_size: LENGTH_PREFIX_SIZE,
            }),
            Some(expected) => Some(Self::MidFrame {
                bytes_received: pending.len() - LENGTH_PREFIX_SIZE,
                expected,
            }),
        }
    }
}

/// Errors raised while decoding inbound bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The length prefix announces a frame larger than the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum accepted frame size.
        max: usize,
    },

    /// A zero-length frame was received where a payload is required.
    #[error("empty frame not permitted")]
    EmptyFrame,

    /// The streaming decompressor rejected the payload.
    #[error("{codec} decompression failed: {reason}")]
    Decompress {
        /// Codec that failed.
        codec: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// A text unit did not contain valid UTF-8.
    #[error("text frame is not valid UTF-8")]
    InvalidText(#[from] FromUtf8Error),

    /// The connection closed with a partial frame buffered.
    #[error("truncated frame at close: {0}")]
    Truncated(#[from] EofError),
}

/// Errors raised while encoding outbound messages.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The streaming compressor failed.
    #[error("{codec} compression failed: {reason}")]
    Compress {
        /// Codec that failed.
        codec: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// The encoded frame does not fit the configured maximum length.
    #[error("encoded frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Size of the frame that was produced.
        size: usize,
        /// Maximum accepted frame size.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[0], 1)]
    #[case(&[0, 0, 0], 3)]
    fn short_pending_is_mid_header(#[case] pending: &[u8], #[case] received: usize) {
        assert_eq!(
            EofError::from_pending(pending),
            Some(EofError::MidHeader {
                bytes_received: received,
                header_size: LENGTH_PREFIX_SIZE,
            })
        );
    }

    #[test]
    fn complete_header_is_mid_frame() {
        let pending = [0, 0, 0, 4];
        assert_eq!(
            EofError::from_pending(&pending),
            Some(EofError::MidFrame {
                bytes_received: 0,
                expected: 4,
            })
        );
    }

    #[test]
    fn truncated_display_includes_cause() {
        let err = DecodeError::from(EofError::MidFrame {
            bytes_received: 3,
            expected: 10,
        });
        assert_eq!(
            err.to_string(),
            "truncated frame at close: premature EOF: 3 bytes of 10 byte frame received"
        );
    }

    #[test]
    fn invalid_utf8_converts() {
        let utf8 = String::from_utf8(vec![0xff, 0xfe]).expect_err("invalid utf-8");
        let err = DecodeError::from(utf8);
        assert!(matches!(err, DecodeError::InvalidText(_)));
    }
}
