//! Adversarial latency injection.

use std::time::Duration;

use crate::filter::{Filter, FilterChainContext, FilterError, NextAction, context::suspend_for};

/// Holds every read and write for a fixed time before forwarding it.
///
/// The pass is suspended and resumed by a timer, so no worker thread blocks.
/// Zero delays pass messages straight through.
#[derive(Clone, Copy, Debug, Default)]
pub struct DelayFilter {
    read_delay: Duration,
    write_delay: Duration,
}

impl DelayFilter {
    /// Create a filter delaying reads by `read_delay` and writes by
    /// `write_delay`.
    #[must_use]
    pub fn new(read_delay: Duration, write_delay: Duration) -> Self {
        Self {
            read_delay,
            write_delay,
        }
    }
}

fn hold(ctx: &mut FilterChainContext, delay: Duration) -> NextAction {
    if delay.is_zero() {
        NextAction::Continue
    } else {
        suspend_for(ctx, delay)
    }
}

impl Filter for DelayFilter {
    fn name(&self) -> &'static str { "delay" }

    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        Ok(hold(ctx, self.read_delay))
    }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, FilterError> {
        Ok(hold(ctx, self.write_delay))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        chain::{FilterChainBuilder, FilterChainEngine},
        connection::test_support::{detached, drain},
    };

    #[tokio::test(start_paused = true)]
    async fn write_is_held_for_the_delay() {
        let (conn, mut rx) = detached();
        let engine = FilterChainEngine::new(
            FilterChainBuilder::new()
                .add(DelayFilter::new(Duration::ZERO, Duration::from_millis(50)))
                .build(),
        );
        let started = Instant::now();
        engine
            .dispatch_write(&conn, Bytes::from_static(b"slow"))
            .await
            .expect("write pass");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(drain(&mut rx), [Bytes::from_static(b"slow")]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_does_not_suspend() {
        let (conn, mut rx) = detached();
        let engine = FilterChainEngine::new(FilterChainBuilder::new().add(DelayFilter::default()).build());
        let started = Instant::now();
        engine
            .dispatch_write(&conn, Bytes::from_static(b"fast"))
            .await
            .expect("write pass");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
