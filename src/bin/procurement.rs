//! procurement: orders parts from a factory server and tallies its reports.
//!
//! ```bash
//! procurement <order_size> <factory_ip> <port>
//! ```

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use factory_procurement::abstractions::communication::udp::UdpLink;
use factory_procurement::abstractions::logging::init_tracing;
use factory_procurement::{Procurement, ProcurementConfig, Reconciliation};

#[derive(Parser)]
#[command(name = "procurement")]
#[command(about = "Order parts from a factory server")]
#[command(version)]
struct Cli {
    /// Number of parts to order
    order_size: u32,

    /// Factory server address
    factory_ip: IpAddr,

    /// Factory server port
    port: u16,

    /// Give up if no confirmation arrives within this many milliseconds
    #[arg(long)]
    confirm_timeout: Option<u64>,

    /// Give up if the factory is silent for this many milliseconds
    #[arg(long)]
    report_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = ProcurementConfig {
        confirm_timeout: cli.confirm_timeout.map(Duration::from_millis),
        report_timeout: cli.report_timeout.map(Duration::from_millis),
    };
    let factory = SocketAddr::new(cli.factory_ip, cli.port);

    let (sender, receiver) = UdpLink::bind("0.0.0.0:0")
        .await
        .context("failed to bind a local port")?;
    info!(local = %sender.local_addr()?, %factory, "procurement started");

    let mut procurement = Procurement::new(sender, receiver, config);
    match procurement.place_order(cli.order_size, factory).await {
        Ok(report) => match report.reconcile() {
            Reconciliation::Match => {
                info!(elapsed = ?report.elapsed, ">>> PROCUREMENT terminated");
                Ok(ExitCode::SUCCESS)
            }
            Reconciliation::Mismatch { .. } => Ok(ExitCode::from(2)),
        },
        Err(err) => {
            error!(%err, "order failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
