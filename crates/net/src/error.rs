//! Network error types

use std::io;

use bicanh_core::ErrorKind;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Length prefix out of bounds; the payload was not consumed
    #[error("Bad frame: {0}")]
    FrameSize(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Server full")]
    ServerFull,

    /// The server processed the request and reported a failure
    #[error("{kind:?}: {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
