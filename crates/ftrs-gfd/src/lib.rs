//! Global Fault Detector (§4.6): aggregates `add`/`remove` membership events
//! from every connected LFD and forwards each one to the RM.
//!
//! The RM link is lazy and best-effort — unlike the LFD's mandatory GFD
//! link, a GFD with no reachable RM still tracks its own `members` view and
//! keeps trying to reconnect on the next event, per §4.6 "connects to the RM
//! (lazy with reconnect on each membership event if currently disconnected)".

mod error;

pub use error::{GfdError, Result};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ftrs_wire::{keyword, read_message, role, write_message, Message};

/// Membership view mutated by inbound LFD events. Kept as a `Vec` rather
/// than a `HashSet`: §3 permits duplicate `add`s and the ordering is
/// otherwise insignificant, but a `Vec` matches the source's list-based
/// membership faithfully.
struct Members {
    ids: Vec<String>,
}

impl Members {
    fn new() -> Self {
        Self { ids: Vec::new() }
    }

    fn add(&mut self, id: &str) {
        self.ids.push(id.to_string());
    }

    fn remove(&mut self, id: &str) {
        if let Some(pos) = self.ids.iter().position(|m| m == id) {
            self.ids.remove(pos);
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|m| m == id)
    }
}

pub struct Gfd {
    id: String,
    listener: TcpListener,
    rm_addr: String,
    members: Mutex<Members>,
    rm_socket: Mutex<Option<TcpStream>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Gfd {
    pub async fn bind(id: impl Into<String>, bind: SocketAddr, rm_addr: impl Into<String>) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(bind).await?;
        Ok(Arc::new(Self {
            id: id.into(),
            listener,
            rm_addr: rm_addr.into(),
            members: Mutex::new(Members::new()),
            rm_socket: Mutex::new(None),
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

    /// A snapshot of the current membership view, in insertion order.
    pub async fn members(&self) -> Vec<String> {
        self.members.lock().await.ids.clone()
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
        let gfd = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            gfd.accept_loop().await;
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn accept_loop(self: Arc<Self>) {
        info!(gfd = %self.id, addr = %self.hostport(), rm = %self.rm_addr, "gfd starting");
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let gfd = Arc::clone(&self);
                    tokio::spawn(async move {
                        gfd.handle_connection(stream).await;
                        debug!(gfd = %gfd.id, peer = %addr, "lfd connection ended");
                    });
                }
                Err(err) => warn!(gfd = %self.id, error = %err, "accept failed"),
            }
        }
    }

    async fn handle_connection(self: &Arc<Self>, mut stream: TcpStream) {
        let handshake = match read_message(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => return,
        };
        if handshake.data.as_deref() != Some(role::LFD) {
            return;
        }
        let lfd_id = handshake.identifier.clone();

        loop {
            let msg = match read_message(&mut stream).await {
                Ok(msg) => msg,
                Err(_) => {
                    self.drop_member(&lfd_id).await;
                    return;
                }
            };
            let Some(event) = msg.data.as_deref() else {
                self.drop_member(&lfd_id).await;
                return;
            };

            match event {
                keyword::ADD => {
                    self.members.lock().await.add(&msg.identifier);
                    info!(gfd = %self.id, lfd = %msg.identifier, "member added");
                    self.forward(&msg.identifier, keyword::ADD).await;
                }
                keyword::REMOVE => {
                    self.members.lock().await.remove(&msg.identifier);
                    info!(gfd = %self.id, lfd = %msg.identifier, "member removed");
                    self.forward(&msg.identifier, keyword::REMOVE).await;
                }
                other => {
                    warn!(gfd = %self.id, lfd = %msg.identifier, event = other, "unknown membership event, ignoring");
                }
            }
        }
    }

    /// §4.6 "On LFD connection close": drop the id if still a member.
    async fn drop_member(&self, lfd_id: &str) {
        let mut guard = self.members.lock().await;
        if guard.contains(lfd_id) {
            guard.remove(lfd_id);
            info!(gfd = %self.id, lfd = lfd_id, "member dropped on link close");
        }
    }

    /// Forwards one membership event to the RM, reconnecting first if the
    /// link is currently down. Never fatal: an unreachable RM just means
    /// this event is dropped and the next one retries the connect.
    async fn forward(&self, member_id: &str, event: &str) {
        let mut slot = self.rm_socket.lock().await;
        if slot.is_none() {
            match self.connect_rm().await {
                Ok(stream) => *slot = Some(stream),
                Err(err) => {
                    warn!(gfd = %self.id, rm = %self.rm_addr, error = %err, "rm unreachable, dropping event");
                    return;
                }
            }
        }

        let stream = slot.as_mut().expect("just set or already connected");
        let forwarded = Message::with_data(member_id, 0, event);
        if write_message(stream, &forwarded).await.is_err() {
            debug!(gfd = %self.id, rm = %self.rm_addr, "rm link closed, will reconnect next event");
            *slot = None;
        }
    }

    async fn connect_rm(&self) -> std::io::Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.rm_addr).await?;
        write_message(&mut stream, &Message::handshake(self.id.as_str(), 0, role::GFD)).await?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftrs_wire::{read_message as recv, write_message as send};
    use tokio::net::TcpListener as StdListener;

    async fn fake_rm() -> (String, tokio::sync::mpsc::UnboundedReceiver<Message>) {
        let listener = StdListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(_handshake) = recv(&mut stream).await else { return };
                    loop {
                        let Ok(msg) = recv(&mut stream).await else { return };
                        let _ = tx.send(msg);
                    }
                });
            }
        });
        (addr, rx)
    }

    async fn connect_as_lfd(gfd_addr: &str, lfd_id: &str) -> tokio::net::TcpStream {
        let mut stream = tokio::net::TcpStream::connect(gfd_addr).await.unwrap();
        send(&mut stream, &Message::handshake(lfd_id, 0, role::LFD)).await.unwrap();
        stream
    }

    #[tokio::test]
    async fn add_then_remove_updates_membership_and_forwards() {
        let (rm_addr, mut rm_events) = fake_rm().await;
        let gfd = Gfd::bind("gfd-1", "127.0.0.1:0".parse().unwrap(), rm_addr).await.unwrap();
        gfd.start().await;

        let mut link = connect_as_lfd(&gfd.hostport(), "replica-a").await;
        send(&mut link, &Message::with_data("replica-a", 0, keyword::ADD)).await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rm_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.identifier, "replica-a");
        assert_eq!(event.data.as_deref(), Some(keyword::ADD));
        assert_eq!(gfd.members().await, vec!["replica-a".to_string()]);

        send(&mut link, &Message::with_data("replica-a", 0, keyword::REMOVE)).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rm_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.data.as_deref(), Some(keyword::REMOVE));
        assert!(gfd.members().await.is_empty());

        gfd.stop().await;
    }

    #[tokio::test]
    async fn link_close_drops_member() {
        let (rm_addr, _rx) = fake_rm().await;
        let gfd = Gfd::bind("gfd-1", "127.0.0.1:0".parse().unwrap(), rm_addr).await.unwrap();
        gfd.start().await;

        let mut link = connect_as_lfd(&gfd.hostport(), "replica-a").await;
        send(&mut link, &Message::with_data("replica-a", 0, keyword::ADD)).await.unwrap();

        for _ in 0..50 {
            if !gfd.members().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(gfd.members().await, vec!["replica-a".to_string()]);

        drop(link);
        for _ in 0..50 {
            if gfd.members().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(gfd.members().await.is_empty());

        gfd.stop().await;
    }

    #[test]
    fn members_allow_duplicate_adds() {
        let mut members = Members::new();
        members.add("a");
        members.add("a");
        assert_eq!(members.ids, vec!["a".to_string(), "a".to_string()]);
        members.remove("a");
        assert_eq!(members.ids, vec!["a".to_string()]);
    }
}
