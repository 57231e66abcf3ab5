//! Accept loop and handshake role-tag dispatch table (§4.3 "Connection
//! dispatch"). One task per inbound connection; the dispatcher keeps
//! re-reading frames on non-terminal tags (`"server"`, `"elect"`) so a
//! single long-lived peer connection can carry state-sync, election, and
//! (eventually) a primary announcement.

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use ftrs_wire::{parse_primary_tag, read_message, role};

use crate::error::Result;
use crate::replica::{self, Replica};

pub(crate) async fn accept_loop(replica: Arc<Replica>) {
    loop {
        match replica.listener.accept().await {
            Ok((stream, addr)) => {
                let replica = Arc::clone(&replica);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(replica, stream).await {
                        debug!(peer = %addr, error = %err, "connection ended with error");
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
            }
        }
    }
}

async fn handle_connection(replica: Arc<Replica>, mut stream: TcpStream) -> Result<()> {
    loop {
        let msg = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return Ok(()),
        };
        let Some(data) = msg.data.clone() else {
            return Ok(());
        };

        if let Some(hostport) = parse_primary_tag(&data) {
            return replica::adopt_primary_from_tag(&replica, stream, &msg, hostport).await;
        }

        match data.as_str() {
            role::CLIENT => return replica::client_loop(&replica, stream).await,
            role::LFD => return replica::lfd_echo_loop(&replica, stream).await,
            role::SERVER => {
                replica::reply_state_sync(&replica, &mut stream).await?;
            }
            role::ELECT => {
                replica::handle_vote_request(&replica, &mut stream, &msg).await?;
            }
            role::BACKUP => {
                if replica.is_primary().await {
                    replica::spawn_checkpoint_sender(&replica, msg.identifier.clone(), stream);
                }
                return Ok(());
            }
            _ => return Ok(()),
        }
    }
}
