//! Command line interface for the `framechain` binary.
//!
//! Kept free of crate dependencies so the build script can render the man
//! page from it.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command line arguments for the `framechain` binary.
#[derive(Debug, Parser)]
#[command(
    name = "framechain",
    version,
    about = "Compressed echo server and client over a filter chain"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the echo server until Ctrl+C.
    Serve {
        /// Port to listen on, on every IPv4 interface.
        #[arg(short, long, default_value_t = 7777)]
        port: u16,
        /// Serve Prometheus metrics on this address.
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
        #[command(flatten)]
        stack: StackArgs,
    },
    /// Send messages to an echo server and verify every echo.
    Send {
        /// Server address.
        #[arg(short, long, default_value = "127.0.0.1:7777")]
        addr: SocketAddr,
        /// Seconds to wait for all echoes.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        #[command(flatten)]
        stack: StackArgs,
        /// Messages to send, in order.
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

/// Stack shape shared by both subcommands.
#[derive(Debug, Args)]
pub struct StackArgs {
    /// Re-segment traffic into pieces of at most this many bytes.
    #[arg(long)]
    pub chunk_size: Option<usize>,
    /// Delay every read by this many milliseconds.
    #[arg(long, default_value_t = 0)]
    pub read_delay_ms: u64,
    /// Delay every write by this many milliseconds.
    #[arg(long, default_value_t = 0)]
    pub write_delay_ms: u64,
    /// Read buffer allocation strategy.
    #[arg(long, value_enum, default_value_t = Allocator::Pooled)]
    pub allocator: Allocator,
    /// Limit on unflushed outbound bytes per connection; 0 disables it.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub max_pending_bytes: i64,
    /// Frame payloads without compressing them.
    #[arg(long)]
    pub identity: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Allocator {
    Pooled,
    OnDemand,
}
