//! Roomledger server binary.
//!
//! # Usage
//!
//! ```bash
//! # Local development with a short cooldown
//! roomledger-server --bind 127.0.0.1:4455 --cooldown-secs 5
//!
//! # Retry failed notification deliveries
//! roomledger-server --delivery-attempts 5 --delivery-backoff-ms 200
//! ```

use clap::Parser;
use roomledger_core::{CallerId, DEFAULT_COOLDOWN_SECS, LedgerConfig};
use roomledger_server::{DEFAULT_MAX_FRAME_BYTES, DeliveryPolicy, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomledger message ledger server
#[derive(Parser, Debug)]
#[command(name = "roomledger-server")]
#[command(about = "Multi-room message ledger server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:4455")]
    bind: String,

    /// Seconds a caller must wait between two posts
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_SECS)]
    cooldown_secs: u64,

    /// Identity that owns the General room
    #[arg(long, default_value = "system")]
    initializer: String,

    /// Largest accepted frame payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,

    /// Notification delivery attempts per event (1 = best effort)
    #[arg(long, default_value = "1")]
    delivery_attempts: u32,

    /// Initial backoff between delivery attempts in milliseconds
    #[arg(long, default_value = "100")]
    delivery_backoff_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn delivery(&self) -> DeliveryPolicy {
        if self.delivery_attempts <= 1 {
            DeliveryPolicy::BestEffort
        } else {
            DeliveryPolicy::Retry {
                max_attempts: self.delivery_attempts,
                initial_backoff_ms: self.delivery_backoff_ms,
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Roomledger server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cooldown_secs == 0 {
        tracing::warn!("Cooldown disabled - posts are not rate limited");
    }

    let config = ServerRuntimeConfig {
        delivery: args.delivery(),
        bind_address: args.bind,
        ledger: LedgerConfig {
            initializer: CallerId::new(args.initializer),
            cooldown_secs: args.cooldown_secs,
        },
        max_frame_bytes: args.max_frame_bytes,
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
