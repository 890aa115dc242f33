//! The filters making up the reference stacks.
//!
//! | Filter | Inbound | Outbound |
//! |--------|---------|----------|
//! | [`TransportFilter`] | raw socket bytes | hands bytes to the writer |
//! | [`ChunkingFilter`] | re-segments bytes | re-segments bytes |
//! | [`DelayFilter`] | waits before forwarding | waits before forwarding |
//! | [`CompressionFilter`] | frames, then decompresses | compresses, then frames |
//! | [`StringFilter`] | decodes text units | encodes text units |
//! | [`EchoFilter`] | writes every message back | - |
//! | [`EchoCheckFilter`] | verifies echoed messages | - |

mod chunking;
mod compression;
mod delay;
mod echo;
mod echo_check;
mod state;
mod string;
mod transport;

pub use chunking::ChunkingFilter;
pub use compression::CompressionFilter;
pub use delay::DelayFilter;
pub use echo::EchoFilter;
pub use echo_check::{EchoCheckFilter, EchoMismatch};
pub use state::ConnectionStates;
pub use string::StringFilter;
pub use transport::TransportFilter;
