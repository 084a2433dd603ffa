use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Error type shared by all transports and drivers.
///
/// The io/anyhow payloads live behind an `Arc` so that errors stay `Clone`
/// and a single failure can be handed to every pending waiter.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("IO error: {0}")]
    Transport(Arc<io::Error>),
    #[error("Timeout")]
    Timeout,
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Instrument is disconnected")]
    Disconnected,
    #[error("Operation not supported by this transport")]
    NotSupported,
    #[error("Error: {0}")]
    Other(Arc<anyhow::Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(err: io::Error) -> Self {
        Error::Transport(Arc::new(err))
    }

    pub fn argument<T: ToString>(msg: T) -> Self {
        Error::Argument(msg.to_string())
    }

    pub fn unexpected<T: ToString>(msg: T) -> Self {
        Error::UnexpectedResponse(msg.to_string())
    }

    pub fn other<T: Into<anyhow::Error>>(err: T) -> Self {
        Error::Other(Arc::new(err.into()))
    }

    /// Whether the failure looks connection-shaped, such that dropping and
    /// reopening the underlying stream may succeed.
    pub fn should_retry(&self) -> bool {
        match self {
            Error::Transport(err) => {
                err.kind() == io::ErrorKind::ConnectionReset
                    || err.kind() == io::ErrorKind::ConnectionAborted
                    || err.kind() == io::ErrorKind::BrokenPipe
                    || err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::UnexpectedEof
            }
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(Arc::new(err))
    }
}
