//! Boots a full RM → GFD → (replica, LFD)×N → client pipeline in one
//! process, for local smoke-testing. The Rust analogue of `original_source`'s
//! `run_all.py`; not part of the core contract and not exercised by any
//! library test.

use std::time::Duration;

use anyhow::{Context, Result};

use ftrs_client::Client;
use ftrs_gfd::Gfd;
use ftrs_lfd::Lfd;
use ftrs_rm::Rm;
use ftrs_server::{Replica, ReplicaConfig, Role};

pub async fn run(host: String, base_port: u16, replica_count: usize, passive: bool, interval: u64) -> Result<()> {
    anyhow::ensure!(replica_count > 0, "devnet needs at least one replica");

    let rm_addr = format!("{host}:{base_port}");
    let gfd_addr = format!("{host}:{}", base_port + 1);
    let replica_ports: Vec<u16> = (0..replica_count).map(|i| base_port + 2 + i as u16).collect();
    let replica_addrs: Vec<String> = replica_ports.iter().map(|p| format!("{host}:{p}")).collect();

    let rm = Rm::bind("rm", rm_addr.parse().context("invalid rm bind address")?).await?;
    rm.start().await;
    tracing::info!(addr = %rm_addr, "devnet: rm up");

    let gfd = Gfd::bind("gfd", gfd_addr.parse().context("invalid gfd bind address")?, rm_addr.clone()).await?;
    gfd.start().await;
    tracing::info!(addr = %gfd_addr, rm = %rm_addr, "devnet: gfd up");

    let role = if passive { Role::Passive } else { Role::Active };
    let mut replicas = Vec::with_capacity(replica_count);
    for (i, bind) in replica_ports.iter().enumerate() {
        let id = format!("r{i}");
        let peers: Vec<String> = replica_addrs
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, addr)| addr.clone())
            .collect();
        let config = ReplicaConfig {
            id: id.clone(),
            bind: format!("{host}:{bind}").parse().context("invalid replica bind address")?,
            peers,
            role,
            checkpoint_interval: Duration::from_secs(interval),
        };
        let replica = Replica::bind(config).await?;
        replica.start().await;
        tracing::info!(replica = %id, addr = %format!("{host}:{bind}"), %role, "devnet: replica up");
        replicas.push((id, replica));
    }

    let mut lfds = Vec::with_capacity(replica_count);
    for (i, (id, _replica)) in replicas.iter().enumerate() {
        let lfd_id = format!("lfd-{i}");
        let lfd = Lfd::new(lfd_id.clone(), replica_addrs[i].clone(), gfd_addr.clone(), Duration::from_secs(interval));
        lfd.start().await.with_context(|| format!("starting {lfd_id} for replica {id}"))?;
        tracing::info!(lfd = %lfd_id, replica = %id, "devnet: lfd up");
        lfds.push(lfd);
    }

    let client = Client::new("devnet-client", replica_addrs, Duration::from_secs(interval));
    client.start(None).await;
    tracing::info!("devnet: client up, fanning out requests");

    super::wait_for_shutdown_signal("devnet").await;

    client.stop().await;
    for lfd in &lfds {
        lfd.stop().await;
    }
    for (_, replica) in &replicas {
        replica.stop().await;
    }
    gfd.stop().await;
    rm.stop().await;
    Ok(())
}
