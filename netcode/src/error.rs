use std::io;
use std::net::AddrParseError;

/// Error kinds distinguished by the networking core.
///
/// Decode errors on an incoming datagram never reach the host as a `NetworkError` — they are
/// logged and the datagram is dropped (see `Connection::dispatch`). This type is for operations
/// the host invokes directly, and for the small number of cases (`Io`) where the underlying
/// socket call itself failed.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("operation not valid in the current connection state")]
    InvalidState,

    #[error("malformed protocol frame: {0}")]
    InvalidProtocolFrame(&'static str),

    #[error("resource pool exhausted: {0}")]
    OutOfResources(&'static str),

    #[error("connection is not connected")]
    NotConnected,

    #[error("connection is already connected")]
    AlreadyConnected,

    #[error("socket I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("could not parse address or configuration: {0}")]
    ParseError(String),
}

impl From<AddrParseError> for NetworkError {
    fn from(err: AddrParseError) -> Self {
        NetworkError::ParseError(err.to_string())
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
