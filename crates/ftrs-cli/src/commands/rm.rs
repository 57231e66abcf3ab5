use std::net::SocketAddr;

use anyhow::{Context, Result};

use ftrs_rm::Rm;

pub async fn run(id: String, host: String, port: u16) -> Result<()> {
    let bind: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let rm = Rm::bind(id.clone(), bind)
        .await
        .with_context(|| format!("binding rm {id:?} to {bind}"))?;
    rm.start().await;

    super::wait_for_shutdown_signal(&id).await;
    rm.stop().await;
    Ok(())
}
