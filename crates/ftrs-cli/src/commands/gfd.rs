use std::net::SocketAddr;

use anyhow::{Context, Result};

use ftrs_gfd::Gfd;

pub async fn run(id: String, host: String, port: u16, rm: String) -> Result<()> {
    let bind: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let gfd = Gfd::bind(id.clone(), bind, rm)
        .await
        .with_context(|| format!("binding gfd {id:?} to {bind}"))?;
    gfd.start().await;

    super::wait_for_shutdown_signal(&id).await;
    gfd.stop().await;
    Ok(())
}
