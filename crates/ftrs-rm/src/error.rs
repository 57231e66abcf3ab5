use thiserror::Error;

pub type Result<T> = std::result::Result<T, RmError>;

#[derive(Debug, Error)]
pub enum RmError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
