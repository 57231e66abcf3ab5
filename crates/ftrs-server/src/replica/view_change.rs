//! Primary election (§4.3.2): the driving algorithm run by a losing or
//! joining replica, and the vote handler for an inbound `"elect"` frame.
//!
//! The protocol is intentionally optimistic and racey — simultaneous
//! "approve" grants from different peers can transiently produce two
//! primaries until the next checkpoint round converges. This is accepted,
//! not fixed (§9).

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use ftrs_wire::{parse_primary_tag, primary_tag, read_message, role, write_message, Message};

use super::{normal, repair, standby, Replica};
use crate::error::{Result, ServerError};

/// Runs the election algorithm to completion: either this replica adopts a
/// primary, becomes primary itself, or (if no peer is reachable) declares
/// itself the default primary.
pub(crate) async fn run_election(replica: &Arc<Replica>) {
    for index in 0..replica.peer_count() {
        if has_primary(replica).await {
            return;
        }
        match elect_one(replica, index).await {
            Ok(true) => return,
            Ok(false) => continue,
            Err(err) => {
                warn!(
                    replica = %replica.id(),
                    peer = replica.peer_addr(index),
                    error = %err,
                    "election exchange failed, trying next peer",
                );
                continue;
            }
        }
    }

    let mut guard = replica.state.lock().await;
    if guard.primary_index.is_none() && !guard.primary {
        guard.become_primary();
        info!(replica = %replica.id(), "declared default primary, no peer responded");
    }
}

async fn has_primary(replica: &Arc<Replica>) -> bool {
    let guard = replica.state.lock().await;
    guard.primary || guard.primary_index.is_some()
}

/// One round of the election exchange against peer `index`. `Ok(true)`
/// means the election concluded (self became primary or adopted one);
/// `Ok(false)` means move on to the next peer.
async fn elect_one(replica: &Arc<Replica>, index: usize) -> Result<bool> {
    if replica.peer_slots[index].lock().await.is_none() {
        normal::connect_peer(replica, index).await?;
    }

    let mut slot = replica.peer_slots[index].lock().await;
    let Some(stream) = slot.as_mut() else {
        return Ok(false);
    };

    write_message(stream, &Message::handshake(replica.id(), 0, role::ELECT)).await?;
    let reply = read_message(stream).await.map_err(|_| ServerError::PeerClosed)?;
    let Some(data) = reply.data.as_deref() else {
        return Ok(false);
    };

    if let Some(hostport) = parse_primary_tag(data) {
        let _ = hostport;
        // §5: the lock is held across the send that commits the outcome, not
        // just the local mutation, so a concurrent `handle_vote_request` can't
        // observe `become_backup_of` having happened without the peer also
        // having received the matching "backup" reply.
        let mut guard = replica.state.lock().await;
        if guard.primary_index.is_some() || guard.primary {
            return Ok(true);
        }
        guard.become_backup_of(index);
        write_message(stream, &Message::handshake(replica.id(), reply.number, role::BACKUP)).await?;
        drop(guard);

        let owned = slot.take().expect("peer stream present");
        drop(slot);

        standby::spawn_backup_reception(replica, index, owned);
        return Ok(true);
    }

    if data == role::APPROVE {
        let mut guard = replica.state.lock().await;
        if guard.primary_index.is_some() || guard.primary {
            return Ok(true);
        }
        guard.become_primary();
        let announcement = primary_tag(&replica.hostport());
        write_message(stream, &Message::handshake(replica.id(), reply.number, announcement)).await?;
        drop(guard);

        let owned = slot.take().expect("peer stream present");
        drop(slot);

        repair::spawn_checkpoint_sender(replica, replica.peer_addr(index).to_string(), owned);
        return Ok(true);
    }

    // "disapprove" or anything else: move on to the next peer.
    Ok(false)
}

/// Vote handler for an inbound `"elect"` frame.
pub(crate) async fn handle_vote_request(
    replica: &Arc<Replica>,
    stream: &mut TcpStream,
    msg: &Message,
) -> Result<()> {
    let vote = {
        let guard = replica.state.lock().await;
        if guard.primary {
            primary_tag(&replica.hostport())
        } else if guard.primary_index.is_none() {
            role::APPROVE.to_string()
        } else {
            role::DISAPPROVE.to_string()
        }
    };
    write_message(stream, &Message::handshake(replica.id(), msg.number, vote)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{Role, ReplicaConfig};

    async fn bare_replica(peers: Vec<String>) -> Arc<Replica> {
        let config = ReplicaConfig {
            id: "r1".into(),
            bind: "127.0.0.1:0".parse().unwrap(),
            peers,
            role: Role::Passive,
            checkpoint_interval: std::time::Duration::from_millis(50),
        };
        Replica::bind(config).await.unwrap()
    }

    #[tokio::test]
    async fn no_peers_declares_default_primary() {
        let replica = bare_replica(vec![]).await;
        run_election(&replica).await;
        let guard = replica.state.lock().await;
        assert!(guard.primary);
        assert!(guard.ready);
        assert!(guard.primary_index.is_none());
    }

    #[tokio::test]
    async fn vote_handler_approves_when_undecided() {
        let replica = bare_replica(vec![]).await;
        let (mut client, server_stream) = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let client = TcpStream::connect(addr).await.unwrap();
            let (server_stream, _) = listener.accept().await.unwrap();
            (client, server_stream)
        };

        let mut server_stream = server_stream;
        let msg = Message::handshake("peer", 0, role::ELECT);
        handle_vote_request(&replica, &mut server_stream, &msg).await.unwrap();

        let reply = read_message(&mut client).await.unwrap();
        assert_eq!(reply.data.as_deref(), Some(role::APPROVE));
    }
}
