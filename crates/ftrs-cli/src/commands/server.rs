use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use ftrs_server::{Replica, ReplicaConfig, Role};

use super::wait_for_shutdown_signal;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    id: String,
    host: String,
    port: u16,
    peers: Vec<String>,
    passive: bool,
    interval: u64,
    topology: Option<PathBuf>,
) -> Result<()> {
    let (bind, peers) = match topology {
        Some(path) => {
            let topology = ftrs_config::Topology::load(&path)
                .with_context(|| format!("loading topology from {}", path.display()))?;
            let node = topology
                .get_node(&id)
                .with_context(|| format!("replica id {id:?} not found in topology"))?;
            let bind: SocketAddr = node
                .hostport()
                .parse()
                .with_context(|| format!("invalid bind address in topology for {id:?}"))?;
            (bind, node.peers.clone())
        }
        None => {
            let bind: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid bind address {host}:{port}"))?;
            (bind, peers)
        }
    };

    let role = if passive { Role::Passive } else { Role::Active };
    let config = ReplicaConfig {
        id: id.clone(),
        bind,
        peers,
        role,
        checkpoint_interval: Duration::from_secs(interval),
    };

    let replica = Replica::bind(config)
        .await
        .with_context(|| format!("binding replica {id:?} to {bind}"))?;
    replica.start().await;
    tracing::info!(replica = %id, addr = %bind, %role, "replica listening");

    wait_for_shutdown_signal(&id).await;
    replica.stop().await;
    Ok(())
}
