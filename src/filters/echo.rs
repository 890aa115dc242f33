//! Server-side echo stage.

use crate::filter::{Filter, FilterChainContext, FilterError, NextAction};

/// Writes every inbound message straight back to the peer.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoFilter;

impl Filter for EchoFilter {
    fn name(&self) -> &'static str { "echo" }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        let message = ctx.take_message();
        ctx.write(message);
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
        filters::{StringFilter, TransportFilter},
    };

    #[tokio::test]
    async fn echoes_through_the_lower_stages() {
        let (conn, mut rx) = detached();
        let engine = FilterChainEngine::new(
            FilterChainBuilder::new()
                .add(TransportFilter)
                .add(StringFilter::default())
                .add(EchoFilter)
                .build(),
        );
        let wire = Bytes::from_static(&[0, 0, 0, 2, b'h', b'i', 0, 0, 0, 1, b'!']);
        engine.dispatch_read(&conn, wire.clone()).await.expect("read pass");
        assert_eq!(drain(&mut rx), [wire.slice(..6), wire.slice(6..)]);
    }
}
