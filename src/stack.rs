//! Reference echo stacks.
//!
//! ```text
//! server: transport -> [chunking] -> [delay] -> compression -> string -> echo
//! client: transport -> [chunking] -> [delay] -> compression -> string -> echo-check
//! ```
//!
//! The bracketed adversarial stages are only present when configured.

use std::{num::NonZeroUsize, time::Duration};

use crate::{
    chain::{FilterChain, FilterChainBuilder},
    codec::{CodecKind, MAX_FRAME_LENGTH},
    completion::CompletionFuture,
    filters::{
        ChunkingFilter,
        CompressionFilter,
        DelayFilter,
        EchoCheckFilter,
        EchoFilter,
        StringFilter,
        TransportFilter,
    },
};

/// Shape of the reference stacks.
///
/// # Examples
///
/// ```
/// use std::{num::NonZeroUsize, time::Duration};
///
/// use framechain::stack::StackOptions;
///
/// let options = StackOptions {
///     chunk_size: NonZeroUsize::new(2),
///     read_delay: Duration::from_millis(50),
///     ..StackOptions::default()
/// };
/// assert_eq!(
///     options.server_chain().names().collect::<Vec<_>>(),
///     ["transport", "chunking", "delay", "compression", "string", "echo"]
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackOptions {
    /// Re-segment all traffic into pieces of at most this many bytes.
    pub chunk_size: Option<NonZeroUsize>,
    /// Delay applied to every read.
    pub read_delay: Duration,
    /// Delay applied to every write.
    pub write_delay: Duration,
    /// Codec used by the compression stage.
    pub codec: CodecKind,
    /// Largest frame accepted by the compression and string stages.
    pub max_frame_length: usize,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            codec: CodecKind::default(),
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

impl StackOptions {
    /// Stages shared by both ends, up to and including the string stage.
    #[must_use]
    pub fn base(&self) -> FilterChainBuilder {
        let mut builder = FilterChainBuilder::new().add(TransportFilter);
        if let Some(size) = self.chunk_size {
            builder = builder.add(ChunkingFilter::new(size));
        }
        if !self.read_delay.is_zero() || !self.write_delay.is_zero() {
            builder = builder.add(DelayFilter::new(self.read_delay, self.write_delay));
        }
        builder
            .add(CompressionFilter::new(self.codec.build()).max_frame_length(self.max_frame_length))
            .add(StringFilter::new(self.max_frame_length))
    }

    /// The echo server chain.
    #[must_use]
    pub fn server_chain(&self) -> FilterChain { self.base().add(EchoFilter).build() }

    /// A client chain sending `messages` in turn and verifying each echo,
    /// reporting to `outcome`.
    #[must_use]
    pub fn client_chain<I, M>(&self, messages: I, outcome: CompletionFuture<()>) -> FilterChain
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.base()
            .add(EchoCheckFilter::new(messages, outcome))
            .build()
    }
}
