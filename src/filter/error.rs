//! Errors raised by filters and the engine driving them.

use thiserror::Error;

use super::Message;
use crate::{
    codec::{DecodeError, EncodeError},
    transport::TransportError,
};

/// Failure of a filter invocation.
///
/// | Variant | Raised by |
/// |---------|-----------|
/// | `Decode` | inbound framing, decompression and text decoding |
/// | `Encode` | outbound compression and framing |
/// | `Transport` | the connection refused or failed a write |
/// | `UnexpectedMessage` | a filter received a variant it cannot handle |
/// | `SuspendWithoutHandle` | a filter returned `Suspend` without calling `suspend()` |
#[derive(Debug, Error)]
pub enum FilterError {
    /// Inbound bytes could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// An outbound message could not be encoded.
    #[error("{0}")]
    Encode(#[from] EncodeError),

    /// The connection failed underneath the chain.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A filter received a message variant it does not accept.
    #[error("{filter} expected a {expected} message, found {found}")]
    UnexpectedMessage {
        /// Filter that rejected the message.
        filter: &'static str,
        /// Variant the filter accepts.
        expected: &'static str,
        /// Variant that arrived.
        found: &'static str,
    },

    /// A filter returned `Suspend` without obtaining a resume handle.
    #[error("{filter} returned Suspend without calling suspend()")]
    SuspendWithoutHandle {
        /// The offending filter.
        filter: &'static str,
    },
}

impl FilterError {
    pub(crate) fn unexpected(filter: &'static str, expected: &'static str, found: &Message) -> Self {
        Self::UnexpectedMessage {
            filter,
            expected,
            found: found.kind(),
        }
    }

    /// Returns `true` if this error came from decoding inbound data.
    #[must_use]
    pub fn is_decode(&self) -> bool { matches!(self, Self::Decode(_)) }

    /// Returns `true` if this error is a new fault that the filters should be
    /// told about.
    ///
    /// A write rejected because the connection is already closing is not: the
    /// close in progress already tears the chain down.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        !matches!(self, Self::Transport(TransportError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FilterError::from(DecodeError::EmptyFrame), true, true)]
    #[case(FilterError::from(TransportError::Closed), false, false)]
    #[case(FilterError::from(TransportError::Io(io::Error::other("reset"))), false, true)]
    #[case(FilterError::SuspendWithoutHandle { filter: "x" }, false, true)]
    fn classification(#[case] err: FilterError, #[case] decode: bool, #[case] disconnect: bool) {
        assert_eq!(err.is_decode(), decode);
        assert_eq!(err.should_disconnect(), disconnect);
    }

    #[test]
    fn decode_error_is_display_and_source() {
        let err = FilterError::from(DecodeError::OversizedFrame { size: 9, max: 8 });
        assert_eq!(err.to_string(), "frame exceeds max length: 9 > 8");
        let source = std::error::Error::source(&err).expect("wrapped cause");
        assert!(matches!(
            source.downcast_ref::<DecodeError>(),
            Some(DecodeError::OversizedFrame { size: 9, max: 8 })
        ));
    }
}
