//! Server error types.

use std::fmt;

/// Errors that can occur in the services.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad node map, etc.).
    ///
    /// Fatal: prevents startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, I/O error, etc.).
    ///
    /// Fatal for the affected connection. The accept loop keeps serving.
    Transport(String),

    /// Protocol error (undecodable request, failed encode).
    ///
    /// The peer receives `{ok:false, error}` where possible and the
    /// connection is closed.
    Protocol(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tracegate_proto::ProtocolError> for ServerError {
    fn from(err: tracegate_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
