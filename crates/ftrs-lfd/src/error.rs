use thiserror::Error;

pub type Result<T> = std::result::Result<T, LfdError>;

#[derive(Debug, Error)]
pub enum LfdError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("gfd at {0} is unreachable (gfd link is mandatory)")]
    GfdUnreachable(String),
}
