//! Checkpoint sender (primary → one backup, §4.3.3) and checkpoint receiver
//! (backup, §4.3.4), including the post-loss backoff-then-elect sequence.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use tracing::{info, warn};

use ftrs_wire::{keyword, read_message, write_message, Message};

use super::{view_change, Replica};

/// Spawns the periodic checkpoint-sending task for a newly acquired backup.
pub(crate) fn spawn_checkpoint_sender(replica: &Arc<Replica>, peer_label: String, stream: TcpStream) {
    let replica = Arc::clone(replica);
    tokio::spawn(async move {
        run_checkpoint_sender(&replica, &peer_label, stream).await;
    });
}

async fn run_checkpoint_sender(replica: &Arc<Replica>, peer_label: &str, mut stream: TcpStream) {
    let mut sequence: u64 = 0;
    loop {
        tokio::time::sleep(replica.checkpoint_interval()).await;

        if !replica.is_primary().await {
            return;
        }

        let (num_requests, state_text) = {
            let guard = replica.state.lock().await;
            (guard.num_requests, guard.value.to_text())
        };

        sequence += 1;
        let checkpoint = Message::with_state(
            replica.id(),
            sequence,
            num_requests.to_string(),
            state_text,
        );
        if write_message(&mut stream, &checkpoint).await.is_err() {
            warn!(replica = %replica.id(), peer = peer_label, "connection closed by backup");
            return;
        }

        match read_message(&mut stream).await {
            Ok(reply) if reply.data.is_some() => {}
            _ => {
                warn!(replica = %replica.id(), peer = peer_label, "connection closed by backup");
                return;
            }
        }
    }
}

/// Checkpoint receiver loop: runs for the lifetime of a backup's connection
/// to its primary. Returns once the primary is lost, after triggering
/// re-election.
pub(crate) async fn run_checkpoint_receiver(replica: &Arc<Replica>, index: usize, mut stream: TcpStream) {
    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => {
                demote_and_reelect(replica, index).await;
                return;
            }
        };

        let parsed = msg
            .data
            .as_deref()
            .and_then(|d| d.parse::<u64>().ok())
            .zip(msg.state.as_deref().and_then(|s| s.parse().ok()));

        let Some((num_requests_p, checkpoint)) = parsed else {
            demote_and_reelect(replica, index).await;
            return;
        };

        replica.state.lock().await.accept_checkpoint(num_requests_p, checkpoint);

        let ack = Message::with_data(replica.id(), msg.number, keyword::OK);
        if write_message(&mut stream, &ack).await.is_err() {
            demote_and_reelect(replica, index).await;
            return;
        }
    }
}

/// On primary loss: clears `primary_index` if it still points at `index`,
/// backs off a random [1s, 6s) delay, then re-runs the election.
async fn demote_and_reelect(replica: &Arc<Replica>, index: usize) {
    let cleared = replica.state.lock().await.clear_primary_if(index);
    if !cleared {
        return;
    }

    let backoff = Duration::from_millis(rand::thread_rng().gen_range(1_000..6_000));
    info!(
        replica = %replica.id(),
        peer = replica.peer_addr(index),
        backoff_ms = backoff.as_millis() as u64,
        "primary lost, backing off before election",
    );
    tokio::time::sleep(backoff).await;
    view_change::run_election(replica).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{Role, ReplicaConfig};
    use ftrs_state::State;
    use tokio::net::TcpListener;

    async fn bare_replica(peers: Vec<String>) -> Arc<Replica> {
        let config = ReplicaConfig {
            id: "backup".into(),
            bind: "127.0.0.1:0".parse().unwrap(),
            peers,
            role: Role::Passive,
            checkpoint_interval: Duration::from_millis(20),
        };
        Replica::bind(config).await.unwrap()
    }

    #[tokio::test]
    async fn receiver_accepts_ahead_checkpoint_and_replies_ok() {
        let replica = bare_replica(vec!["127.0.0.1:1".into()]).await;
        replica.state.lock().await.become_backup_of(0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_replica = Arc::clone(&replica);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_checkpoint_receiver(&server_replica, 0, stream).await;
        });

        let mut primary = TcpStream::connect(addr).await.unwrap();
        let checkpoint = Message::with_state("primary", 1, "3", State::from(9).to_text());
        write_message(&mut primary, &checkpoint).await.unwrap();
        let ack = read_message(&mut primary).await.unwrap();
        assert_eq!(ack.data.as_deref(), Some(keyword::OK));

        assert_eq!(replica.state.lock().await.num_requests, 3);
        assert_eq!(replica.state.lock().await.value.value(), 9);

        drop(primary);
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn receiver_triggers_reelection_on_primary_close() {
        let replica = bare_replica(vec![]).await;
        replica.state.lock().await.become_backup_of(0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_replica = Arc::clone(&replica);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_checkpoint_receiver(&server_replica, 0, stream).await;
        });

        let primary = TcpStream::connect(addr).await.unwrap();
        drop(primary);

        server_task.await.unwrap();
        let guard = replica.state.lock().await;
        assert!(guard.primary_index.is_none());
        assert!(guard.primary);
    }
}
