use std::io;

use thiserror::Error;

/// Terminal failure on a single connection. Always local to one client.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed by peer")]
    Closed,
    #[error("connection i/o failed")]
    Io(#[from] io::Error),
    #[error("frame could not be encoded or decoded")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("hub dispatcher is no longer running")]
    Unavailable,
}
