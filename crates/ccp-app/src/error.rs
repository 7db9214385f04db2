use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("relay refused registration: {status}: {message}")]
    Registration { status: String, message: String },

    #[error("connection to relay lost")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Network(#[from] ccp_network::NetworkError),

    #[error(transparent)]
    Protocol(#[from] ccp_protocol::ProtocolError),
}
