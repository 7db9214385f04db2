use ccp_protocol::{Envelope, ErrorReply, Frame, Role};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::NetworkError;

/// Where and as whom to dial the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `ws://host:port`, without the `/ws/...` path.
    pub base_url: String,
    pub role: Role,
    pub client_id: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, role: Role, client_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            role,
            client_id: client_id.into(),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/ws/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.role.path_segment(),
            self.client_id
        )
    }
}

/// Close code and reason sent by the relay, when it sent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Events produced by the reader task.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Envelope),
    /// `{error, details}` reply from the relay.
    RelayError(ErrorReply),
    /// A text frame that did not decode.
    Malformed { raw: String, error: String },
    /// Always the last event.
    Closed(Option<CloseInfo>),
}

enum Outgoing {
    Envelope(Envelope),
    Close,
}

/// Cloneable handle for enqueueing messages to the relay.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl RelaySender {
    pub fn send(&self, envelope: Envelope) -> Result<(), NetworkError> {
        self.tx
            .send(Outgoing::Envelope(envelope))
            .map_err(|_| NetworkError::ChannelClosed)
    }

    /// Ask the writer to send a close frame and stop.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open relay connection.
pub struct Connection {
    sender: RelaySender,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl Connection {
    pub fn sender(&self) -> RelaySender {
        self.sender.clone()
    }

    pub fn send(&self, envelope: Envelope) -> Result<(), NetworkError> {
        self.sender.send(envelope)
    }

    /// Next inbound event; `None` once the reader task has finished.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    pub fn split(self) -> (RelaySender, mpsc::UnboundedReceiver<Inbound>) {
        (self.sender, self.inbound)
    }
}

/// Dial the relay and spawn the reader and writer tasks.
pub async fn connect(endpoint: &Endpoint) -> Result<Connection, NetworkError> {
    let url = endpoint.url();
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| NetworkError::Connect {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    tracing::info!(url = %url, role = %endpoint.role, "Connected to relay");

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();

    tokio::spawn(async move {
        while let Some(item) = out_rx.recv().await {
            match item {
                Outgoing::Envelope(envelope) => {
                    let text = match envelope.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping unencodable message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                        tracing::warn!(error = %e, "Relay write failed");
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        let mut close_info = None;
        while let Some(frame) = stream.next().await {
            let event = match frame {
                Ok(WsMessage::Text(text)) => match Frame::decode(text.as_str()) {
                    Ok(Frame::Message(envelope)) => Inbound::Message(envelope),
                    Ok(Frame::Error(reply)) => Inbound::RelayError(reply),
                    Err(e) => Inbound::Malformed {
                        raw: text.to_string(),
                        error: e.to_string(),
                    },
                },
                Ok(WsMessage::Close(frame)) => {
                    close_info = frame.map(|f| CloseInfo {
                        code: u16::from(f.code),
                        reason: f.reason.to_string(),
                    });
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Relay read failed");
                    break;
                }
            };
            if in_tx.send(event).is_err() {
                break;
            }
        }
        tracing::debug!(?close_info, "Relay connection closed");
        let _ = in_tx.send(Inbound::Closed(close_info));
    });

    Ok(Connection {
        sender: RelaySender { tx: out_tx },
        inbound: in_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_uses_role_segment() {
        let ep = Endpoint::new("ws://127.0.0.1:8000/", Role::Application, "shop-1");
        assert_eq!(ep.url(), "ws://127.0.0.1:8000/ws/software/shop-1");

        let ep = Endpoint::new("ws://relay:9000", Role::Controller, "agent-7");
        assert_eq!(ep.url(), "ws://relay:9000/ws/agent/agent-7");
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ep = Endpoint::new(format!("ws://{addr}"), Role::Controller, "agent-1");
        let err = connect(&ep).await.err().expect("nothing listens there");
        assert!(matches!(err, NetworkError::Connect { .. }));
    }
}
