//! Client request loop, LFD heartbeat echo, and peer state-sync (§4.3,
//! §4.3.1).

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use ftrs_wire::{keyword, read_message, role, write_message, DecodeError, Message};

use super::{ClientOutcome, Replica};
use crate::error::{Result, ServerError};

/// Outbound peer connect: dials `index`, performs the `"server"` handshake,
/// and adopts the peer's state if it is ahead (§3 state-sync on connect).
pub(crate) async fn connect_peer(replica: &Arc<Replica>, index: usize) -> Result<()> {
    let addr = replica.peer_addr(index).to_string();
    let mut stream = TcpStream::connect(&addr).await?;

    let our_num_requests = replica.state.lock().await.num_requests;
    write_message(
        &mut stream,
        &Message::handshake(replica.id(), our_num_requests, role::SERVER),
    )
    .await?;

    let reply = read_message(&mut stream).await.map_err(|_| ServerError::PeerClosed)?;
    if reply.data.as_deref() == Some(role::SERVER) {
        let peer_num_requests = reply.number;
        let peer_state = reply.state.as_deref().and_then(|s| s.parse().ok());
        if let Some(peer_state) = peer_state {
            let mut guard = replica.state.lock().await;
            if guard.accept_state_sync(peer_num_requests, peer_state) {
                info!(
                    replica = %replica.id(),
                    peer = %addr,
                    num_requests = peer_num_requests,
                    "caught up from peer on connect",
                );
            }
            guard.peer_connected[index] = true;
        }
    }

    *replica.peer_slots[index].lock().await = Some(stream);
    Ok(())
}

/// Inbound dispatch: reply to a `"server"` handshake with our own state so
/// the initiator can catch up.
pub(crate) async fn reply_state_sync(replica: &Arc<Replica>, stream: &mut TcpStream) -> Result<()> {
    let (num_requests, state_text) = {
        let guard = replica.state.lock().await;
        (guard.num_requests, guard.value.to_text())
    };
    write_message(
        stream,
        &Message::with_state(replica.id(), num_requests, role::SERVER, state_text),
    )
    .await?;
    Ok(())
}

/// §4.3.1 client request loop. The initial `"client"` handshake frame is
/// answered with a bare acknowledgement (the client only checks that a
/// peer identifier came back, per §4.4's reconnect protocol); every frame
/// after that is a real request.
pub(crate) async fn client_loop(replica: &Arc<Replica>, mut stream: TcpStream) -> Result<()> {
    write_message(&mut stream, &Message::handshake(replica.id(), 0, keyword::OK)).await?;

    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(DecodeError::Empty) => return Ok(()),
            Err(err) => {
                debug!(replica = %replica.id(), error = %err, "client frame decode failed");
                return Ok(());
            }
        };

        let Some(raw) = msg.data.as_deref() else {
            return Ok(());
        };
        let Ok(value) = raw.parse::<i64>() else {
            warn!(replica = %replica.id(), raw, "client request was not an integer, ignoring");
            continue;
        };

        let outcome = replica.state.lock().await.apply_client_request(value);
        let reply = match outcome {
            ClientOutcome::Buffered => Message::with_data(replica.id(), msg.number, keyword::OK),
            ClientOutcome::Applied(response) => {
                Message::with_data(replica.id(), msg.number, response.to_string())
            }
        };
        write_message(&mut stream, &reply).await?;
    }
}

/// LFD heartbeat echo loop: every received frame's payload is echoed back
/// verbatim until the peer closes. The initial `"lfd"` handshake frame is
/// answered with a bare acknowledgement, matching the client handshake.
pub(crate) async fn lfd_echo_loop(replica: &Arc<Replica>, mut stream: TcpStream) -> Result<()> {
    write_message(&mut stream, &Message::handshake(replica.id(), 0, keyword::OK)).await?;

    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return Ok(()),
        };
        let Some(payload) = msg.data else {
            return Ok(());
        };
        write_message(&mut stream, &Message::with_data(replica.id(), msg.number, payload)).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{Role, ReplicaConfig};
    use ftrs_wire::{read_message as recv, write_message as send};
    use tokio::net::TcpListener;

    async fn bare_replica(role: Role) -> Arc<Replica> {
        let config = ReplicaConfig {
            id: "r1".into(),
            bind: "127.0.0.1:0".parse().unwrap(),
            peers: vec![],
            role,
            checkpoint_interval: std::time::Duration::from_secs(1),
        };
        Replica::bind(config).await.unwrap()
    }

    #[tokio::test]
    async fn client_handshake_ack_then_echoes_requests() {
        let replica = bare_replica(Role::Active).await;
        replica.state.lock().await.ready = true;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_replica = Arc::clone(&replica);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            client_loop(&server_replica, stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        send(&mut client, &Message::handshake("c1", 0, role::CLIENT)).await.unwrap();
        let ack = recv(&mut client).await.unwrap();
        assert_eq!(ack.identifier, replica.id());

        send(&mut client, &Message::with_data("c1", 1, "7")).await.unwrap();
        let reply = recv(&mut client).await.unwrap();
        assert_eq!(reply.data.as_deref(), Some("7"));

        drop(client);
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn passive_backup_replies_ok_and_buffers() {
        let replica = bare_replica(Role::Passive).await;
        replica.state.lock().await.ready = true; // ready, but not primary

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_replica = Arc::clone(&replica);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            client_loop(&server_replica, stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        send(&mut client, &Message::handshake("c1", 0, role::CLIENT)).await.unwrap();
        recv(&mut client).await.unwrap();

        send(&mut client, &Message::with_data("c1", 1, "4")).await.unwrap();
        let reply = recv(&mut client).await.unwrap();
        assert_eq!(reply.data.as_deref(), Some(keyword::OK));

        assert_eq!(replica.state.lock().await.log, vec![4]);

        drop(client);
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn lfd_echoes_heartbeat_payload() {
        let replica = bare_replica(Role::Active).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_replica = Arc::clone(&replica);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            lfd_echo_loop(&server_replica, stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        send(&mut client, &Message::handshake("lfd-1", 0, role::LFD)).await.unwrap();
        recv(&mut client).await.unwrap();

        send(&mut client, &Message::with_data("lfd-1", 1, keyword::HEARTBEAT)).await.unwrap();
        let reply = recv(&mut client).await.unwrap();
        assert_eq!(reply.data.as_deref(), Some(keyword::HEARTBEAT));

        drop(client);
        let _ = server_task.await;
    }
}
