#[derive(Debug, thiserror::Error)]
pub enum WinstonError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("invalid channel code: {0:?}")]
    InvalidChannelCode(String),

    #[error("invalid time: {0:?}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, WinstonError>;
