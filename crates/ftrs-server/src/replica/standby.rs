//! Backup bootstrap: adopting an announced primary and transitioning into
//! the checkpoint-receiver loop (§4.3 dispatch entry `"primary|<hostport>"`,
//! §4.3.2 election outcome, §4.3.4).

use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use ftrs_wire::{role, write_message, Message};

use super::{repair, Replica};
use crate::error::Result;

/// Inbound dispatch case: a peer's outbound socket announces itself as
/// primary over an already-open connection — this happens after we earlier
/// voted `"approve"` to that peer's own election round.
pub(crate) async fn adopt_primary_from_tag(
    replica: &Arc<Replica>,
    mut stream: TcpStream,
    msg: &Message,
    hostport: &str,
) -> Result<()> {
    let Some(index) = replica.config.peers.iter().position(|p| p == hostport) else {
        warn!(replica = %replica.id(), primary = %hostport, "primary announced by unrecognised peer hostport");
        return Ok(());
    };

    {
        let mut guard = replica.state.lock().await;
        if guard.primary_index != Some(index) {
            info!(replica = %replica.id(), primary = %hostport, "adopting primary");
        }
        guard.become_backup_of(index);
    }

    write_message(&mut stream, &Message::handshake(replica.id(), msg.number, role::BACKUP)).await?;
    repair::run_checkpoint_receiver(replica, index, stream).await;
    Ok(())
}

/// Spawns a task that owns `stream` as the checkpoint-receive connection to
/// the peer that just won this replica's own election round (§4.3.2 step d).
pub(crate) fn spawn_backup_reception(replica: &Arc<Replica>, index: usize, stream: TcpStream) {
    let replica = Arc::clone(replica);
    tokio::spawn(async move {
        repair::run_checkpoint_receiver(&replica, index, stream).await;
    });
}
