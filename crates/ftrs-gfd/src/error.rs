use thiserror::Error;

pub type Result<T> = std::result::Result<T, GfdError>;

#[derive(Debug, Error)]
pub enum GfdError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
