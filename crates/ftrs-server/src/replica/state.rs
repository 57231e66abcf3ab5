use ftrs_state::State;

/// A replica's replication mode. Active replicas apply every client request
/// directly; passive replicas elect one primary and ship checkpoints to the
/// rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Active,
    Passive,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Active => "active",
            Role::Passive => "passive",
        })
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Role::Active),
            "passive" => Ok(Role::Passive),
            other => Err(format!("unknown replica role: {other}")),
        }
    }
}

/// The result of applying a client request under the replica lock.
pub enum ClientOutcome {
    /// Buffered to the log; the client sees a plain acknowledgement.
    Buffered,
    /// Applied directly; carries the new sum.
    Applied(i64),
}

/// Everything protected by the replica's single mutex (§5 shared state).
pub struct ReplicaState {
    pub value: State,
    pub num_requests: u64,
    pub log: Vec<i64>,
    pub ready: bool,
    pub primary: bool,
    pub primary_index: Option<usize>,
    pub peer_connected: Vec<bool>,
    pub role: Role,
}

impl ReplicaState {
    pub fn new(role: Role, peer_count: usize) -> Self {
        Self {
            value: State::new(),
            num_requests: 0,
            log: Vec::new(),
            ready: false,
            primary: false,
            primary_index: None,
            peer_connected: vec![false; peer_count],
            role,
        }
    }

    /// True when a client request is applied directly rather than buffered
    /// (§4.3.1): the replica is ready, and is either active or the primary.
    fn serves_directly(&self) -> bool {
        self.ready && (matches!(self.role, Role::Active) || self.primary)
    }

    /// §4.3.1 client request loop body.
    pub fn apply_client_request(&mut self, value: i64) -> ClientOutcome {
        if self.serves_directly() {
            let response = self.value.update(value);
            self.num_requests += 1;
            ClientOutcome::Applied(response)
        } else {
            self.log.push(value);
            ClientOutcome::Buffered
        }
    }

    /// State-sync on peer connect: adopt the peer's state if it is ahead,
    /// replaying the buffered log on top of it.
    pub fn accept_state_sync(&mut self, peer_num_requests: u64, peer_state: State) -> bool {
        if peer_num_requests <= self.num_requests {
            return false;
        }
        self.value = peer_state;
        self.num_requests = peer_num_requests;
        let log = std::mem::take(&mut self.log);
        self.value.replay(&log);
        self.ready = true;
        true
    }

    /// §4.3.4 checkpoint-accept procedure.
    pub fn accept_checkpoint(&mut self, peer_num_requests: u64, checkpoint: State) -> bool {
        if peer_num_requests <= self.num_requests {
            return false;
        }
        self.value = checkpoint;
        self.num_requests = peer_num_requests;
        let log = std::mem::take(&mut self.log);
        self.value.replay(&log);
        true
    }

    pub fn become_backup_of(&mut self, peer_index: usize) {
        self.primary = false;
        self.ready = false;
        self.primary_index = Some(peer_index);
    }

    pub fn become_primary(&mut self) {
        self.primary = true;
        self.ready = true;
        self.primary_index = None;
    }

    /// Clears `primary_index` if it still points at `peer_index`, marking
    /// that peer disconnected. Returns whether a clear actually happened
    /// (the caller only re-elects the first time this fires).
    pub fn clear_primary_if(&mut self, peer_index: usize) -> bool {
        if self.primary_index == Some(peer_index) {
            self.primary_index = None;
            if let Some(flag) = self.peer_connected.get_mut(peer_index) {
                *flag = false;
            }
            true
        } else {
            false
        }
    }
}
