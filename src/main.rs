//! `framechain` echo server and verifying client.

mod cli;

use std::{num::NonZeroUsize, process::ExitCode, time::Duration};

use clap::Parser;
use cli::{Allocator, Cli, Command, StackArgs};
use framechain::{
    buffer::AllocatorKind,
    codec::CodecKind,
    completion::CompletionFuture,
    stack::StackOptions,
    transport::{TcpConnector, TcpTransport, TransportConfig},
};
use tracing::{error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "framechain failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), BoxError> {
    match command {
        Command::Serve {
            port,
            metrics_addr,
            stack,
        } => {
            if let Some(addr) = metrics_addr {
                install_metrics(addr)?;
            }
            let (options, config) = stack_config(&stack);
            let mut transport = TcpTransport::with_config(options.server_chain(), config);
            let addr = transport.bind_port(port)?;
            transport.start()?;
            info!(%addr, "echo server listening");
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            transport.shutdown().await;
            Ok(())
        }
        Command::Send {
            addr,
            timeout_secs,
            stack,
            messages,
        } => {
            let (options, config) = stack_config(&stack);
            let timeout = Duration::from_secs(timeout_secs);
            let count = messages.len();
            let outcome = CompletionFuture::new();
            let connector =
                TcpConnector::with_config(options.client_chain(messages, outcome.clone()), config);
            let connection = connector.connect(addr).wait_timeout(timeout).await?;
            let verified = outcome.wait_timeout(timeout).await;
            let _ = connection.close_silently().wait_timeout(timeout).await;
            connector.shutdown().await;
            verified?;
            info!(%addr, count, "all echoes verified");
            Ok(())
        }
    }
}

fn stack_config(args: &StackArgs) -> (StackOptions, TransportConfig) {
    let options = StackOptions {
        chunk_size: args.chunk_size.and_then(NonZeroUsize::new),
        read_delay: Duration::from_millis(args.read_delay_ms),
        write_delay: Duration::from_millis(args.write_delay_ms),
        codec: if args.identity {
            CodecKind::Identity
        } else {
            CodecKind::default()
        },
        ..StackOptions::default()
    };
    let config = TransportConfig {
        allocator: match args.allocator {
            Allocator::Pooled => AllocatorKind::Pooled,
            Allocator::OnDemand => AllocatorKind::OnDemand,
        },
        max_pending_bytes: args.max_pending_bytes,
        ..TransportConfig::default()
    };
    (options, config)
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "metrics exporter listening");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), BoxError> {
    tracing::warn!(%addr, "built without the metrics feature; exporter disabled");
    Ok(())
}
