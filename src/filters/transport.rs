//! The stage closest to the socket.

use crate::filter::{Filter, FilterChainContext, FilterError, NextAction};

/// First filter of a chain, bridging it to the connection's socket.
///
/// Reads pass through untouched. Writes reaching this filter are handed to
/// the connection's writer and end the pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportFilter;

impl Filter for TransportFilter {
    fn name(&self) -> &'static str { "transport" }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let bytes = ctx.take_message().into_bytes(self.name())?;
        if !bytes.is_empty() {
            ctx.connection().enqueue(bytes)?;
        }
        Ok(NextAction::Stop)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{
        chain::{FilterChainBuilder, FilterChainEngine},
        connection::test_support::{detached, drain},
    };

    #[tokio::test]
    async fn writes_reach_the_outbound_queue_once() {
        let (conn, mut rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(TransportFilter).build());
        engine
            .dispatch_write(&conn, Bytes::from_static(b"wire"))
            .await
            .expect("write pass");
        assert_eq!(drain(&mut rx), [Bytes::from_static(b"wire")]);
    }

    #[tokio::test]
    async fn text_cannot_reach_the_socket() {
        let (conn, _rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(TransportFilter).build());
        let err = engine
            .dispatch_write(&conn, "text")
            .await
            .expect_err("text rejected");
        assert!(matches!(
            err,
            FilterError::UnexpectedMessage {
                filter: "transport",
                expected: "bytes",
                found: "text"
            }
        ));
    }
}
