use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use stc_directory::HttpDirectoryClient;
use stc_metrics::MetricsRecorder;
use stc_node::{config::NodeConfig, LogSink, PublisherRole, SubscriberRole};
use stc_transport::HttpBrokerClient;

#[derive(Parser)]
#[command(name = "stc-node")]
#[command(about = "Secure telemetry channel node")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Sample telemetry, encrypt it for the peer, and publish it
    Publish,
    /// Listen on the peer's topic and decrypt its telemetry
    Subscribe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "stc_node={0},stc_directory={0},stc_transport={0},stc_crypto={0}",
            args.log_level
        ))
        .init();

    let config = if let Some(config_path) = &args.config {
        NodeConfig::load_from_file(config_path)?
    } else {
        NodeConfig::load_from_env()
    };
    config.validate()?;

    info!(device_id = %config.device_id, peer_id = %config.peer_id, "starting stc-node");

    let directory = HttpDirectoryClient::new(config.gateway_url.as_str())?;
    let transport = HttpBrokerClient::new(config.broker_url.as_str())?;
    let metrics = match &config.metrics_file {
        Some(path) => MetricsRecorder::to_file(path.clone()),
        None => MetricsRecorder::disabled(),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    match args.role {
        Role::Publish => {
            let mut role = PublisherRole::new(config, directory, transport, metrics);
            role.run(shutdown_rx).await?;
        }
        Role::Subscribe => {
            let mut role = SubscriberRole::new(
                config,
                directory,
                transport,
                metrics,
                Arc::new(LogSink),
            );
            role.run(shutdown_rx).await?;
        }
    }

    info!("stc-node stopped");
    Ok(())
}
