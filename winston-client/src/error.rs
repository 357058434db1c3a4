use std::time::Duration;

/// Errors that can occur during Winston client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response framing or payload decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] winston_rs_protocol::WinstonError),

    /// Connect or request exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The connection was closed, locally or by the server, before the answer arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The response header echoed a different request id.
    #[error("response id {actual:?} does not match request id {expected:?}")]
    IdMismatch { expected: String, actual: String },

    /// The decoded response is not the kind the command produces.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
