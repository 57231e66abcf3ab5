use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by connection-level helpers. Per the propagation policy,
/// every variant here is recovered locally by the caller (demote the
/// connection, mark the peer disconnected) — none of them should bubble up
/// to terminate a replica's supervisor task.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Wire(#[from] ftrs_wire::DecodeError),

    #[error("peer closed the connection")]
    PeerClosed,
}
