//! Ordered filter pipelines.
//!
//! A [`FilterChain`] is immutable once built. Inbound events run through it
//! in build order, starting at the transport stage; outbound writes run in the
//! exact reverse. Chains are cheap to clone and share their filters, so one
//! chain serves every connection of a transport.

use std::{fmt, sync::Arc};

use crate::filter::Filter;

pub mod engine;

pub use engine::FilterChainEngine;

/// Immutable ordered sequence of filters.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl FilterChain {
    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize { self.filters.len() }

    /// Returns `true` for a chain without filters.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.filters.is_empty() }

    /// The filter at `index`, counted from the transport end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Filter>> { self.filters.get(index) }

    /// Filters in inbound order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> + '_ { self.filters.iter() }

    /// Filter names in inbound order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters.iter().map(|filter| filter.name())
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builder assembling a [`FilterChain`].
///
/// # Examples
///
/// ```
/// use framechain::{
///     chain::FilterChainBuilder,
///     filters::{EchoFilter, StringFilter, TransportFilter},
/// };
///
/// let chain = FilterChainBuilder::new()
///     .add(TransportFilter)
///     .add(StringFilter::default())
///     .add(EchoFilter)
///     .build();
/// assert_eq!(chain.names().collect::<Vec<_>>(), ["transport", "string", "echo"]);
/// ```
#[derive(Clone, Default)]
pub struct FilterChainBuilder {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChainBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `filter` after the filters added so far.
    #[must_use]
    pub fn add(self, filter: impl Filter) -> Self { self.add_shared(Arc::new(filter)) }

    /// Append a filter instance shared with other chains.
    #[must_use]
    pub fn add_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Freeze the filters into a chain.
    ///
    /// Building again yields another chain sharing the same filter
    /// instances.
    #[must_use]
    pub fn build(&self) -> FilterChain {
        FilterChain {
            filters: self.filters.iter().cloned().collect(),
        }
    }
}

impl fmt::Debug for FilterChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{EchoFilter, TransportFilter};

    #[test]
    fn rebuilding_shares_filter_instances() {
        let builder = FilterChainBuilder::new().add(TransportFilter).add(EchoFilter);
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first.len(), 2);
        let (Some(a), Some(b)) = (first.get(1), second.get(1)) else {
            panic!("both chains have two filters");
        };
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(format!("{first:?}"), "[\"transport\", \"echo\"]");
    }
}
