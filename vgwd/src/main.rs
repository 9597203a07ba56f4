#![forbid(unsafe_code)]

//! vgwd — gateway load-balancing daemon.
//!
//! Loads the TOML configuration, opens the Hello multicast socket and the
//! raw ARP socket on the group interface, then hands everything to the
//! orchestrator until SIGINT/SIGTERM. Startup failures exit non-zero;
//! a signalled shutdown exits zero.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vgw_core::{DaemonConfig, LocalInfo, SystemClock};
use vgw_group::ForwarderSelector;
use vgw_net::{NetInfo, RawArpBus, UdpHelloBus};
use vgwd::{Daemon, GroupSettings};

#[derive(Debug, Parser)]
#[command(name = "vgwd", version, about = "Gateway load-balancing daemon")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/vgwd.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("signal received, shutting down");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = DaemonConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_tracing(args.log_level.as_deref().or(cfg.log_level.as_deref()));

    let info: Arc<dyn LocalInfo> = Arc::new(NetInfo::new(&cfg));
    let local_ip = info
        .local_ip()
        .with_context(|| format!("resolving IPv4 on {}", cfg.interface))?;

    let hello = Arc::new(
        UdpHelloBus::open(local_ip, cfg.multicast_addr(), u16::from(cfg.group_id))
            .context("opening hello multicast socket")?,
    );
    let arp = Arc::new(RawArpBus::open(&cfg.interface).context("opening arp socket")?);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let daemon = Daemon::new(
        GroupSettings::from_config(&cfg),
        info,
        hello,
        arp,
        ForwarderSelector::round_robin(),
        SystemClock,
    )?;
    daemon.run(cancel).await?;
    Ok(())
}
