use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("task description is empty")]
    EmptyTask,

    #[error("application {0} is not in the current listing")]
    UnknownApplication(String),

    #[error("no capability snapshot to plan against")]
    NoSnapshot,

    #[error("no application selected")]
    NoSelection,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Network(#[from] ccp_network::NetworkError),

    #[error(transparent)]
    Protocol(#[from] ccp_protocol::ProtocolError),
}
