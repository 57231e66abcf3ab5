use std::time::Duration;

use anyhow::Result;

use ftrs_client::Client;

pub async fn run(id: String, replicas: Vec<String>, interval: u64, limit: Option<u64>) -> Result<()> {
    let client = Client::new(id.clone(), replicas, Duration::from_secs(interval));
    client.start(limit).await;

    if limit.is_some() {
        while client.is_running().await {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    } else {
        super::wait_for_shutdown_signal(&id).await;
    }

    client.stop().await;
    Ok(())
}
