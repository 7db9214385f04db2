use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("connection to relay is closed")]
    ChannelClosed,

    #[error(transparent)]
    Protocol(#[from] ccp_protocol::ProtocolError),
}
