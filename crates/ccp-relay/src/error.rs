use ccp_protocol::{ProtocolError, Role};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The sender's own outbound queue is gone; its loop must end.
    #[error("{role} connection {id} is closed")]
    ConnectionClosed { role: Role, id: String },
}

/// Outcome of a direct send that did not reach its target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no {role} registered as {id}")]
    NotFound { role: Role, id: String },

    #[error("{role} channel {id} is closed")]
    Closed { role: Role, id: String },
}
