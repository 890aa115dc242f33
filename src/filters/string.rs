//! Length-prefixed UTF-8 text units.

use bytes::BytesMut;

use super::ConnectionStates;
use crate::{
    codec::{DecodeError, EofError, LengthPrefixed, MAX_FRAME_LENGTH},
    filter::{Filter, FilterChainContext, FilterError, Message, NextAction},
};

/// Converts between `[4-byte big-endian length][UTF-8]` units and
/// [`Message::Text`].
///
/// Inbound bytes are buffered per connection until a whole unit is present.
/// Empty strings are valid units.
#[derive(Debug)]
pub struct StringFilter {
    framing: LengthPrefixed,
    inbound: ConnectionStates<BytesMut>,
}

impl StringFilter {
    /// Create a filter accepting units of up to `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            framing: LengthPrefixed::new(max_frame_length).allow_empty(true),
            inbound: ConnectionStates::new(),
        }
    }
}

impl Default for StringFilter {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

impl Filter for StringFilter {
    fn name(&self) -> &'static str { "string" }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let incoming = ctx.take_message().into_bytes(self.name())?;
        let id = ctx.connection_id();
        self.inbound.with(
            id,
            BytesMut::new,
            |buffered| -> Result<NextAction, FilterError> {
                buffered.extend_from_slice(&incoming);
                let Some(unit) = self.framing.decode(buffered)? else {
                    return Ok(NextAction::Stop);
                };
                let text = String::from_utf8(unit.to_vec()).map_err(DecodeError::from)?;
                ctx.set_message(Message::Text(text));
                Ok(if self.framing.has_frame(buffered) {
                    NextAction::Rerun
                } else {
                    NextAction::Continue
                })
            },
        )
    }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let text = ctx.take_message().into_text(self.name())?;
        let mut unit = BytesMut::with_capacity(text.len() + 4);
        self.framing.encode(text.as_bytes(), &mut unit)?;
        ctx.set_message(unit.freeze());
        Ok(NextAction::Continue)
    }

    fn handle_close(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        match self
            .inbound
            .remove(ctx.connection_id())
            .and_then(|buffered| EofError::from_pending(&buffered))
        {
            Some(eof) => Err(DecodeError::Truncated(eof).into()),
            None => Ok(NextAction::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::{
        byte_order::write_network_u32,
        chain::{FilterChainBuilder, FilterChainEngine},
        connection::test_support::{detached, drain},
    };

    #[derive(Default)]
    struct Texts(Mutex<Vec<String>>);

    impl Filter for Texts {
        fn name(&self) -> &'static str { "texts" }

        fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
            let text = ctx.take_message().into_text(self.name())?;
            self.0.lock().expect("texts lock").push(text);
            Ok(NextAction::Stop)
        }
    }

    fn unit(text: &str) -> Vec<u8> {
        let len = u32::try_from(text.len()).expect("short text");
        let mut out = write_network_u32(len).to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[tokio::test]
    async fn writes_text_as_prefixed_unit() {
        let (conn, mut rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(StringFilter::default()).build());
        engine.dispatch_write(&conn, "héllo").await.expect("write pass");
        engine.dispatch_write(&conn, "").await.expect("write pass");
        assert_eq!(drain(&mut rx).concat(), [unit("héllo"), unit("")].concat());
    }

    #[tokio::test]
    async fn decodes_units_split_and_coalesced() {
        let (conn, _rx) = detached();
        let texts = Arc::new(Texts::default());
        let engine = FilterChainEngine::new(
            FilterChainBuilder::new()
                .add(StringFilter::default())
                .add_shared(texts.clone())
                .build(),
        );
        let wire = [unit("one"), unit(""), unit("three")].concat();
        let (head, tail) = wire.split_at(2);
        engine
            .dispatch_read(&conn, Bytes::copy_from_slice(head))
            .await
            .expect("read pass");
        engine
            .dispatch_read(&conn, Bytes::copy_from_slice(tail))
            .await
            .expect("read pass");
        assert_eq!(*texts.0.lock().expect("texts lock"), ["one", "", "three"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_decode_error() {
        let (conn, _rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(StringFilter::default()).build());
        let mut wire = write_network_u32(2).to_vec();
        wire.extend_from_slice(&[0xc3, 0x28]);
        let err = engine
            .dispatch_read(&conn, Bytes::from(wire))
            .await
            .expect_err("invalid text");
        assert!(matches!(err, FilterError::Decode(DecodeError::InvalidText(_))));
    }

    #[tokio::test]
    async fn bytes_are_rejected_on_write() {
        let (conn, _rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(StringFilter::default()).build());
        let err = engine
            .dispatch_write(&conn, Bytes::from_static(b"raw"))
            .await
            .expect_err("bytes are not text");
        assert!(matches!(
            err,
            FilterError::UnexpectedMessage {
                filter: "string",
                expected: "text",
                found: "bytes"
            }
        ));
    }

    #[tokio::test]
    async fn close_reports_partial_header() {
        let (conn, _rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(StringFilter::default()).build());
        engine
            .dispatch_read(&conn, Bytes::from_static(&[0, 0, 0]))
            .await
            .expect("partial header is buffered");
        let failures = engine.dispatch_close(&conn);
        assert!(matches!(
            failures.as_slice(),
            [FilterError::Decode(DecodeError::Truncated(EofError::MidHeader {
                bytes_received: 3,
                header_size: 4
            }))]
        ));
    }
}
