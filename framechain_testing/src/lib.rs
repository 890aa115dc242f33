//! Helpers for driving `framechain` stacks in tests.
//!
//! Scenarios run the reference echo stacks either over real loopback sockets
//! ([`start_echo_server`], [`run_echo_client`]) or over an in-memory
//! `tokio::io::duplex` pipe ([`duplex_echo`]).
//!
//! ```rust
//! use framechain::{buffer::AllocatorKind, stack::StackOptions};
//! use framechain_testing::duplex_echo;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let outcome = duplex_echo(StackOptions::default(), AllocatorKind::Pooled, ["Hello world"]).await;
//! assert!(outcome.is_ok());
//! # }
//! ```

pub mod logging;
pub mod scenario;
pub mod text;

pub use logging::{CapturedRecord, LogCapture, log_capture};
pub use scenario::{SCENARIO_TIMEOUT, duplex_echo, run_echo_client, start_echo_server};
pub use text::{random_text, sequential_messages};
