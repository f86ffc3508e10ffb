//! Roomcast server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address
//! roomcast-server
//!
//! # Public interface with tighter limits
//! roomcast-server --bind 0.0.0.0:7878 --max-connections 500 --max-rooms 8
//! ```

use clap::Parser;
use roomcast_core::RegistryConfig;
use roomcast_server::{Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomcast room server
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Line-protocol chat room server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Maximum rooms a single connection may join
    #[arg(long, default_value = "64")]
    max_rooms: usize,

    /// Longest accepted command line in bytes
    #[arg(long, default_value = "4096")]
    max_line_length: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Roomcast server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        max_line_length: args.max_line_length,
        registry: RegistryConfig {
            max_connections: args.max_connections,
            max_rooms_per_connection: args.max_rooms,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
