//! Multi-replica request fan-out: reconnects on loss, samples one request
//! per round, and surfaces the first authoritative response while logging
//! duplicates (§4.4).

mod error;

pub use error::{ClientError, Result};

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ftrs_wire::{keyword, read_message, role, write_message, Message};

struct ReplicaLink {
    addr: String,
    stream: Option<TcpStream>,
}

/// A client fanning requests out to a fixed list of replica `host:port`s.
pub struct Client {
    id: String,
    interval: Duration,
    links: Mutex<Vec<ReplicaLink>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn new(id: impl Into<String>, replicas: Vec<String>, interval: Duration) -> Arc<Self> {
        let links = replicas
            .into_iter()
            .map(|addr| ReplicaLink { addr, stream: None })
            .collect();
        Arc::new(Self {
            id: id.into(),
            interval,
            links: Mutex::new(links),
            handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts the request loop. `limit = Some(n)` sends `n` requests then
    /// stops on its own; `None` runs until every replica is unreachable.
    pub async fn start(self: &Arc<Self>, limit: Option<u64>) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }
        let client = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            client.run(limit).await;
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>, limit: Option<u64>) {
        let mut k: u64 = 0;
        loop {
            k += 1;
            if let Some(limit) = limit {
                if k > limit {
                    return;
                }
            }

            self.reconnect_all().await;

            if !self.any_connected().await {
                info!(
                    client = %self.id,
                    "stopping client after {} successful request(s)",
                    k.saturating_sub(1),
                );
                return;
            }

            let value = rand::thread_rng().gen_range(1..=10);
            match self.send_round(k, value).await {
                Some(response) => {
                    info!(client = %self.id, request = k, value, response, "response");
                }
                None => {
                    warn!(client = %self.id, request = k, value, "no authoritative response this round");
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn any_connected(&self) -> bool {
        self.links.lock().await.iter().any(|link| link.stream.is_some())
    }

    async fn reconnect_all(&self) {
        let mut links = self.links.lock().await;
        for link in links.iter_mut() {
            if link.stream.is_some() {
                continue;
            }
            match reconnect(&self.id, &link.addr).await {
                Ok(stream) => {
                    debug!(client = %self.id, peer = %link.addr, "reconnected");
                    link.stream = Some(stream);
                }
                Err(err) => {
                    debug!(client = %self.id, peer = %link.addr, error = %err, "reconnect failed");
                }
            }
        }
    }

    /// Sends request `k` carrying `value` to every connected replica.
    /// Returns the first authoritative (non-`"ok"`) response, if any; an
    /// `"ok"` reply is a passive-mode buffered acknowledgement and is never
    /// treated as the authoritative answer, even though it is the first
    /// reply to arrive.
    async fn send_round(&self, k: u64, value: i64) -> Option<i64> {
        let mut links = self.links.lock().await;
        let mut response = None;

        for link in links.iter_mut() {
            let Some(stream) = link.stream.as_mut() else {
                continue;
            };

            let request = Message::with_data(self.id.as_str(), k, value.to_string());
            if write_message(stream, &request).await.is_err() {
                link.stream = None;
                continue;
            }

            let reply = match read_message(stream).await {
                Ok(reply) => reply,
                Err(_) => {
                    link.stream = None;
                    continue;
                }
            };

            match reply.data.as_deref() {
                Some(keyword::OK) => {}
                Some(text) => {
                    if let Ok(parsed) = text.parse::<i64>() {
                        if response.is_none() {
                            response = Some(parsed);
                        } else {
                            info!(client = %self.id, request = k, peer = %link.addr, response = parsed, "-duplicate");
                        }
                    }
                }
                None => {
                    link.stream = None;
                }
            }
        }

        response
    }
}

async fn reconnect(id: &str, addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    write_message(&mut stream, &Message::handshake(id, 0, role::CLIENT)).await?;
    let reply = read_message(&mut stream).await.map_err(|_| ClientError::PeerClosed)?;
    if reply.identifier.is_empty() {
        return Err(ClientError::PeerClosed);
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A minimal stand-in replica: accepts a handshake, then replies to
    /// every subsequent request with a fixed value.
    async fn fake_replica_always_replying(value: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            write_message(&mut stream, &Message::handshake("r1", 0, keyword::OK)).await.unwrap();
            loop {
                let Ok(msg) = read_message(&mut stream).await else { return };
                let reply = Message::with_data("r1", msg.number, value);
                if write_message(&mut stream, &reply).await.is_err() {
                    return;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn authoritative_response_wins_over_ok() {
        let authoritative = fake_replica_always_replying("10").await;
        let buffered = fake_replica_always_replying(keyword::OK).await;

        let client = Client::new("c1", vec![authoritative, buffered], Duration::from_millis(10));
        client.reconnect_all().await;
        let response = client.send_round(1, 7).await;
        assert_eq!(response, Some(10));
    }

    #[tokio::test]
    async fn duplicate_authoritative_responses_are_suppressed_not_overwritten() {
        let a = fake_replica_always_replying("5").await;
        let b = fake_replica_always_replying("5").await;

        let client = Client::new("c1", vec![a, b], Duration::from_millis(10));
        client.reconnect_all().await;
        let response = client.send_round(1, 5).await;
        assert_eq!(response, Some(5));
    }

    #[tokio::test]
    async fn unreachable_replica_never_blocks_a_round() {
        let client = Client::new("c1", vec!["127.0.0.1:1".to_string()], Duration::from_millis(10));
        client.reconnect_all().await;
        assert!(!client.any_connected().await);
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let client = Client::new("c1", vec![], Duration::from_millis(5));
        client.start(Some(1)).await;
        assert!(client.is_running().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.stop().await;
    }
}
