use crate::store::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] winston_rs_protocol::WinstonError),
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
