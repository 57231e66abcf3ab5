//! Replication Manager (§4.7): the fleet-level membership view above the
//! GFD. Mutates its `members` list identically to the GFD on `add`/`remove`
//! events, but — per source behaviour — clears the entire view when its GFD
//! connection closes, rather than dropping a single id (§9 notes this may be
//! over-eager; it is preserved as-is, same as the GFD's own link-close rule).

mod error;

pub use error::{Result, RmError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ftrs_wire::{keyword, read_message, role, Message};

pub struct Rm {
    id: String,
    listener: TcpListener,
    members: Mutex<Vec<String>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Rm {
    pub async fn bind(id: impl Into<String>, bind: SocketAddr) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(bind).await?;
        Ok(Arc::new(Self {
            id: id.into(),
            listener,
            members: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hostport(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    }

    pub async fn members(&self) -> Vec<String> {
        self.members.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }
        let rm = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            rm.accept_loop().await;
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn accept_loop(self: Arc<Self>) {
        info!(rm = %self.id, addr = %self.hostport(), "rm starting");
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let rm = Arc::clone(&self);
                    tokio::spawn(async move {
                        rm.handle_connection(stream).await;
                        debug!(rm = %rm.id, peer = %addr, "gfd connection ended");
                    });
                }
                Err(err) => warn!(rm = %self.id, error = %err, "accept failed"),
            }
        }
    }

    async fn handle_connection(self: &Arc<Self>, mut stream: TcpStream) {
        let handshake = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return,
        };
        if handshake.data.as_deref() != Some(role::GFD) {
            return;
        }

        loop {
            let msg = match read_message(&mut stream).await {
                Ok(msg) => msg,
                Err(_) => {
                    let mut members = self.members.lock().await;
                    if !members.is_empty() {
                        members.clear();
                        info!(rm = %self.id, "gfd link closed, membership cleared");
                    }
                    return;
                }
            };

            match msg.data.as_deref() {
                Some(keyword::ADD) => {
                    self.members.lock().await.push(msg.identifier.clone());
                    info!(rm = %self.id, member = %msg.identifier, "member added");
                }
                Some(keyword::REMOVE) => {
                    let mut members = self.members.lock().await;
                    if let Some(pos) = members.iter().position(|m| m == &msg.identifier) {
                        members.remove(pos);
                    }
                    info!(rm = %self.id, member = %msg.identifier, "member removed");
                }
                other => {
                    warn!(rm = %self.id, member = %msg.identifier, event = ?other, "unknown membership event, ignoring");
                }
            }
        }
    }
}
