//! Local Fault Detector (§4.5): heartbeats one replica and reports up/down
//! transitions to a GFD.
//!
//! The state machine is `{Disconnected, Connected, Member}` (§4.5). This is
//! the only component whose steady-state loop runs on a plain interval
//! ticker rather than a per-connection task — there is exactly one replica
//! link and one GFD link to manage, so a single task owns both.

mod error;

pub use error::{LfdError, Result};

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ftrs_wire::{keyword, read_message, role, write_message, DecodeError, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Disconnected,
    Connected,
    Member,
}

struct LfdState {
    replica_socket: Option<TcpStream>,
    /// The single GFD link, established once at `start()` and reused for
    /// every `add`/`remove` (§4.5: one mandatory link, not one per event).
    gfd_socket: Option<TcpStream>,
    membership: Membership,
    heartbeat_seq: u64,
}

/// A Local Fault Detector watching one replica and reporting to one GFD.
pub struct Lfd {
    id: String,
    replica_addr: String,
    gfd_addr: String,
    interval: Duration,
    state: Mutex<LfdState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Lfd {
    pub fn new(
        id: impl Into<String>,
        replica_addr: impl Into<String>,
        gfd_addr: impl Into<String>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            replica_addr: replica_addr.into(),
            gfd_addr: gfd_addr.into(),
            interval,
            state: Mutex::new(LfdState {
                replica_socket: None,
                gfd_socket: None,
                membership: Membership::Disconnected,
                heartbeat_seq: 0,
            }),
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

    /// Connects to the GFD (mandatory — abort if unreachable) and holds that
    /// link for every subsequent `add`/`remove`, then launches the heartbeat
    /// loop. Idempotent while already running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        // The GFD link is mandatory per §4.5: "on failure, abort".
        let gfd_socket = connect_gfd(&self.id, &self.gfd_addr)
            .await
            .map_err(|_| LfdError::GfdUnreachable(self.gfd_addr.clone()))?;
        self.state.lock().await.gfd_socket = Some(gfd_socket);

        let lfd = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            lfd.run().await;
        }));
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>) {
        info!(lfd = %self.id, replica = %self.replica_addr, gfd = %self.gfd_addr, "lfd starting");
        loop {
            self.tick().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn tick(&self) {
        let mut guard = self.state.lock().await;

        if guard.replica_socket.is_none() {
            match reconnect_replica(&self.id, &self.replica_addr).await {
                Ok(stream) => {
                    debug!(lfd = %self.id, replica = %self.replica_addr, "reconnected to replica");
                    guard.replica_socket = Some(stream);
                }
                Err(err) => {
                    debug!(lfd = %self.id, replica = %self.replica_addr, error = %err, "replica reconnect failed");
                    return;
                }
            }
        }

        guard.heartbeat_seq += 1;
        let seq = guard.heartbeat_seq;
        let socket = guard.replica_socket.as_mut().expect("just set or already connected");
        let alive = send_heartbeat(socket, &self.id, seq).await;

        if alive {
            if guard.membership != Membership::Member {
                let guard = &mut *guard;
                if self.announce(guard, keyword::ADD).await {
                    guard.membership = Membership::Member;
                }
            }
        } else {
            guard.replica_socket = None;
            let was_member = guard.membership == Membership::Member;
            guard.membership = Membership::Disconnected;
            if was_member {
                // Always transition to Connected per §4.5, regardless of
                // whether the GFD send below succeeds — the replica link is
                // gone either way, not the GFD link.
                let guard = &mut *guard;
                self.announce(guard, keyword::REMOVE).await;
                guard.membership = Membership::Connected;
            }
        }
    }

    /// Sends an `add`/`remove` event over the held GFD link, reconnecting
    /// first (with a fresh handshake) if that link is currently down.
    /// Returns whether the send was acknowledged.
    async fn announce(&self, state: &mut LfdState, event: &str) -> bool {
        if state.gfd_socket.is_none() {
            match connect_gfd(&self.id, &self.gfd_addr).await {
                Ok(stream) => state.gfd_socket = Some(stream),
                Err(err) => {
                    warn!(lfd = %self.id, gfd = %self.gfd_addr, error = %err, event, "gfd unreachable for membership event");
                    return false;
                }
            }
        }

        let socket = state.gfd_socket.as_mut().expect("just set or already connected");
        let sent = write_message(socket, &Message::with_data(self.id.as_str(), 0, event)).await.is_ok();
        if sent {
            info!(lfd = %self.id, event, "reported membership event to gfd");
        } else {
            warn!(lfd = %self.id, gfd = %self.gfd_addr, event, "membership event send failed");
            state.gfd_socket = None;
        }
        sent
    }
}

/// Connects to the GFD and sends the one-time `"lfd"` handshake for the
/// link that `announce` then reuses for every subsequent event.
async fn connect_gfd(id: &str, addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    write_message(&mut stream, &Message::handshake(id, 0, role::LFD)).await?;
    Ok(stream)
}

async fn reconnect_replica(id: &str, addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    write_message(&mut stream, &Message::handshake(id, 0, role::LFD)).await?;
    let reply = read_message(&mut stream).await.map_err(|_| LfdError::PeerClosed)?;
    if reply.identifier.is_empty() {
        return Err(LfdError::PeerClosed);
    }
    Ok(stream)
}

/// Sends one heartbeat and waits for the echo. Returns `false` on any
/// failure, which the caller interprets as "heartbeat lost" (§4.5).
async fn send_heartbeat(stream: &mut TcpStream, id: &str, seq: u64) -> bool {
    let request = Message::with_data(id, seq, keyword::HEARTBEAT);
    if write_message(stream, &request).await.is_err() {
        return false;
    }
    match read_message(stream).await {
        Ok(reply) => reply.data.is_some(),
        Err(DecodeError::Empty) => false,
        Err(_) => false,
    }
}
