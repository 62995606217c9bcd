use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yapyap_core::PeerId;
use yapyap_node::{Cli, NodeConfig, YapyapNode};
use yapyap_storage::SqliteStorage;
use yapyap_transport::MockNetwork;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    let bootstrap_peers = cli
        .bootstrap_peers
        .iter()
        .map(|s| PeerId::parse(s).map_err(|e| anyhow::anyhow!("invalid bootstrap peer {s}: {e}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut router_config = yapyap_router::RouterConfig::default();
    if let Some(rate) = cli.origin_rate_per_sec {
        router_config.origin_rate_per_sec = rate;
    }
    if let Some(rate) = cli.sender_rate_per_sec {
        router_config.sender_rate_per_sec = rate;
    }

    let config = NodeConfig::with_data_dir(cli.data_dir)
        .with_router_config(router_config)
        .with_control_plane_port(cli.control_plane_port)
        .with_bootstrap_peers(bootstrap_peers);

    for warning in config.validate() {
        tracing::warn!(%warning, "configuration warning");
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SqliteStorage::open(config.database_path())?);

    // No overlay transport fabric exists in this workspace yet (it's an
    // external collaborator); a lone in-process mock network lets this
    // node start and listen for itself without one.
    let network = MockNetwork::new();
    let transport = Arc::new(network.transport());

    let node = YapyapNode::new(config, store, transport).await?;
    network.listen(node.self_id().clone());

    tracing::info!(peer = %node.self_id(), "starting node");
    node.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    node.shutdown().await?;

    Ok(())
}
