//! The replica: a single networked node that serves client requests and
//! participates in active or passive replication.
//!
//! Submodules mirror the protocol's own phases rather than a generic
//! event-loop split: [`state`] holds the mutex-guarded fields and their
//! invariant-preserving mutators, [`normal`] is steady-state traffic
//! (client requests, LFD heartbeats, peer state-sync), [`view_change`] is
//! primary election, and [`repair`]/[`standby`] are the checkpoint
//! protocol and backup bootstrap.

mod normal;
mod repair;
mod standby;
mod view_change;
pub mod state;

pub use state::{ClientOutcome, ReplicaState, Role};

pub(crate) use normal::{client_loop, lfd_echo_loop, reply_state_sync};
pub(crate) use repair::spawn_checkpoint_sender;
pub(crate) use standby::adopt_primary_from_tag;
pub(crate) use view_change::handle_vote_request;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatch;
use crate::error::Result;

/// Static configuration for one replica process.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub id: String,
    pub bind: SocketAddr,
    /// Peer `host:port`s, in the stable order used to index `peer_slots`.
    pub peers: Vec<String>,
    pub role: Role,
    pub checkpoint_interval: Duration,
}

/// A bound, not-yet-started replica. Construct with [`Replica::bind`], then
/// call [`Replica::start`].
pub struct Replica {
    pub(crate) config: ReplicaConfig,
    pub(crate) listener: TcpListener,
    pub(crate) state: Mutex<ReplicaState>,
    /// One outbound connection slot per peer index. `None` means either
    /// never connected, or handed off to a dedicated checkpoint task.
    pub(crate) peer_slots: Vec<Mutex<Option<TcpStream>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Replica {
    /// Binds the listening socket. Does not start serving connections —
    /// call [`Replica::start`] for that.
    pub async fn bind(config: ReplicaConfig) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.bind).await?;
        let peer_count = config.peers.len();
        let role = config.role;
        Ok(Arc::new(Self {
            state: Mutex::new(ReplicaState::new(role, peer_count)),
            peer_slots: (0..peer_count).map(|_| Mutex::new(None)).collect(),
            handle: Mutex::new(None),
            listener,
            config,
        }))
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// The actual bound address, as reported by the listener — not
    /// `config.bind` verbatim, so binding to port 0 (as tests do) reports
    /// the OS-assigned ephemeral port rather than `:0`.
    pub fn hostport(&self) -> String {
        self.listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.config.bind.to_string())
    }

    pub fn peer_addr(&self, index: usize) -> &str {
        &self.config.peers[index]
    }

    pub fn peer_count(&self) -> usize {
        self.config.peers.len()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.config.role, Role::Active)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        self.config.checkpoint_interval
    }

    pub async fn is_primary(&self) -> bool {
        self.state.lock().await.primary
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.ready
    }

    pub async fn num_requests(&self) -> u64 {
        self.state.lock().await.num_requests
    }

    pub async fn value(&self) -> i64 {
        self.state.lock().await.value.value()
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts the accept loop, connects to peers, and (in passive mode)
    /// runs the initial election. Idempotent: a second call while already
    /// running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }
        let replica = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            replica.run().await;
        }));
    }

    /// Aborts the supervisor task and everything it spawned, and drops the
    /// bound listener.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn run(self: Arc<Self>) {
        info!(replica = %self.id(), addr = %self.hostport(), role = %self.config.role, "replica starting");

        let accept_replica = Arc::clone(&self);
        tokio::spawn(async move {
            dispatch::accept_loop(accept_replica).await;
        });

        for index in 0..self.peer_count() {
            if let Err(err) = normal::connect_peer(&self, index).await {
                warn!(
                    replica = %self.id(),
                    peer = self.peer_addr(index),
                    error = %err,
                    "initial peer connect failed",
                );
            }
        }

        match self.config.role {
            Role::Active => {
                self.state.lock().await.ready = true;
                info!(replica = %self.id(), "active replica ready");
            }
            Role::Passive => {
                view_change::run_election(&self).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn active_replica_becomes_ready_with_no_peers() {
        let config = ReplicaConfig {
            id: "solo".into(),
            bind: "127.0.0.1:0".parse().unwrap(),
            peers: vec![],
            role: Role::Active,
            checkpoint_interval: Duration::from_secs(1),
        };
        let replica = Replica::bind(config).await.unwrap();
        replica.start().await;
        assert!(replica.is_running().await);

        for _ in 0..50 {
            if replica.is_ready().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(replica.is_ready().await);
        replica.stop().await;
        assert!(!replica.is_running().await);
    }

    #[tokio::test]
    async fn passive_replica_with_no_peers_defaults_to_primary() {
        let config = ReplicaConfig {
            id: "solo-passive".into(),
            bind: "127.0.0.1:0".parse().unwrap(),
            peers: vec![],
            role: Role::Passive,
            checkpoint_interval: Duration::from_secs(1),
        };
        let replica = Replica::bind(config).await.unwrap();
        replica.start().await;

        for _ in 0..50 {
            if replica.is_primary().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(replica.is_primary().await);
        replica.stop().await;
    }
}
