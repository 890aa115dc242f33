#![doc(html_root_url = "https://docs.rs/framechain/latest")]
//! Composable filter-chain network stack.
//!
//! Bytes arriving on a connection run through an ordered [`FilterChain`]
//! of independent stages, each free to transform, buffer, split, delay or
//! answer them. Writes run through the same chain in reverse. The reference
//! stacks in [`stack`] combine streaming compression, length-prefixed text
//! framing and an echo stage.
//!
//! ```no_run
//! use framechain::{
//!     completion::CompletionFuture,
//!     stack::StackOptions,
//!     transport::{TcpConnector, TcpTransport},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let options = StackOptions::default();
//! let mut server = TcpTransport::new(options.server_chain());
//! let addr = server.bind(([127, 0, 0, 1], 0).into())?;
//! server.start()?;
//!
//! let outcome = CompletionFuture::new();
//! let client = TcpConnector::new(options.client_chain(["Hello world"], outcome.clone()));
//! let _connection = client.connect(addr).await?;
//! outcome.await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod byte_order;
pub mod chain;
pub mod codec;
pub mod completion;
pub mod connection;
pub mod filter;
pub mod filters;
pub mod metrics;
pub mod panic;
pub mod stack;
pub mod transport;

pub use chain::{FilterChain, FilterChainBuilder, FilterChainEngine};
pub use completion::{CompletionError, CompletionFuture};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use filter::{Filter, FilterChainContext, FilterError, Message, NextAction};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
