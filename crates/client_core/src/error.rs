use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid page url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported page protocol '{0}'")]
    UnsupportedProtocol(String),
    #[error("page url has no host")]
    MissingHost,
    #[error("socket is closed")]
    SocketClosed,
}
