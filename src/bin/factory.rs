//! factory: accepts orders over UDP and fulfils them with sub-factories.
//!
//! ```bash
//! factory [workers] [port]
//! factory 4 5000 --drop-rate 0.1
//! ```
//!
//! Log level comes from `FACTORY_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use factory_procurement::abstractions::communication::fair_loss_point_to_point_links::FairLossConfig;
use factory_procurement::abstractions::communication::udp::UdpLink;
use factory_procurement::abstractions::logging::init_tracing;
use factory_procurement::config::{FactoryConfig, Staffing, DEFAULT_PORT};
use factory_procurement::FactoryServer;

#[derive(Parser)]
#[command(name = "factory")]
#[command(about = "Fulfil part orders with a pool of concurrent sub-factories")]
#[command(version)]
struct Cli {
    /// Sub-factories per order
    #[arg(default_value_t = 1)]
    workers: u32,

    /// UDP port to accept orders on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Smallest sub-factory capacity
    #[arg(long, default_value_t = 10)]
    min_capacity: u32,

    /// Largest sub-factory capacity
    #[arg(long, default_value_t = 50)]
    max_capacity: u32,

    /// Shortest production time in milliseconds
    #[arg(long, default_value_t = 500)]
    min_duration: u32,

    /// Longest production time in milliseconds
    #[arg(long, default_value_t = 1200)]
    max_duration: u32,

    /// Seed for reproducible capacities and durations
    #[arg(long)]
    seed: Option<u64>,

    /// Probability of dropping each outgoing message
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,

    /// Probability of duplicating each outgoing message
    #[arg(long, default_value_t = 0.0)]
    duplicate_rate: f64,

    /// Exit after the first order
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = FactoryConfig::builder()
        .workers(cli.workers)
        .port(cli.port)
        .staffing(Staffing::Random {
            capacity: cli.min_capacity..=cli.max_capacity,
            duration_ms: cli.min_duration..=cli.max_duration,
            seed: cli.seed,
        })
        .link(FairLossConfig::new(cli.drop_rate, cli.duplicate_rate)?)
        .build()
        .context("invalid factory configuration")?;

    let (sender, receiver) = UdpLink::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(
        addr = %receiver.local_addr()?,
        workers = config.workers,
        "factory server bound"
    );

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel_token.clone()));

    let server = FactoryServer::new(config, sender, receiver)?;
    let stats = server.link_stats();
    if cli.once {
        server.serve_one(cancel_token).await?;
    } else {
        server.serve(cancel_token).await?;
    }

    let (offered, dropped, duplicated) = stats.snapshot();
    info!(offered, dropped, duplicated, "goodbye");
    Ok(())
}

async fn shutdown_on_signal(cancel_token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            error!(%err, "unable to listen for shutdown signal");
                            return;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                error!(%err, "unable to listen for SIGTERM");
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "unable to listen for shutdown signal");
        return;
    }

    info!("shutdown requested");
    cancel_token.cancel();
}
