use std::time::Duration;

use anyhow::{Context, Result};

use ftrs_lfd::Lfd;

pub async fn run(id: String, replica: String, gfd: String, interval: u64) -> Result<()> {
    let lfd = Lfd::new(id.clone(), replica, gfd, Duration::from_secs(interval));
    lfd.start()
        .await
        .with_context(|| format!("starting lfd {id:?} (gfd link is mandatory)"))?;

    super::wait_for_shutdown_signal(&id).await;
    lfd.stop().await;
    Ok(())
}
