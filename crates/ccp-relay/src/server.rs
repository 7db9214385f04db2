//! HTTP + WebSocket front of the relay.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use ccp_protocol::{Role, CLOSE_CODE_UNKNOWN_ROLE};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock, Semaphore};

use crate::config::RelayConfig;
use crate::registry::Outbound;
use crate::state::RelayState;

#[derive(Clone)]
struct WebState {
    state: Arc<RwLock<RelayState>>,
    permits: Arc<Semaphore>,
}

pub struct RelayServer {
    config: RelayConfig,
    state: Arc<RwLock<RelayState>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let state = Arc::new(RwLock::new(RelayState::new(&config)));
        Self { config, state }
    }

    pub fn state(&self) -> Arc<RwLock<RelayState>> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        let web_state = WebState {
            state: self.state.clone(),
            permits: Arc::new(Semaphore::new(self.config.max_connections)),
        };
        Router::new()
            .route("/", get(banner))
            .route("/api/health", get(api_health))
            .route("/api/applications", get(api_applications))
            .route("/api/trace", get(api_trace))
            .route("/ws/:role/:client_id", get(ws_handler))
            .with_state(web_state)
    }

    /// Bind `config.bind_addr` and serve until the listener fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let app = self.router();
        tracing::info!(
            addr = %listener.local_addr()?,
            max_connections = self.config.max_connections,
            "CCP relay listening"
        );
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn banner() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "CCP relay is running.",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_health(State(web): State<WebState>) -> impl IntoResponse {
    Json(web.state.read().await.health())
}

async fn api_applications(State(web): State<WebState>) -> impl IntoResponse {
    Json(web.state.read().await.applications())
}

async fn api_trace(State(web): State<WebState>) -> impl IntoResponse {
    Json(web.state.read().await.trace.clone())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((role, client_id)): Path<(String, String)>,
    State(web): State<WebState>,
) -> Response {
    let Some(role) = Role::from_path_segment(&role) else {
        tracing::warn!(role = %role, client_id = %client_id, "Rejecting unknown client role");
        return ws.on_upgrade(reject_unknown_role);
    };

    let permit = match web.permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(role = %role, client_id = %client_id, "Connection limit reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "relay at capacity").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, role, client_id, web.state).await;
        drop(permit);
    })
}

async fn reject_unknown_role(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: CLOSE_CODE_UNKNOWN_ROLE,
        reason: "Unknown client type".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_socket(
    socket: WebSocket,
    role: Role,
    client_id: String,
    state: Arc<RwLock<RelayState>>,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let mut peer = state.write().await.connect(role, &client_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let result = match out {
                Outbound::Text(text) => sink.send(Message::Text(text)).await,
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let result = state.write().await.handle_inbound(&mut peer, &text);
                if let Err(e) = result {
                    tracing::warn!(peer = %peer.label(), error = %e, "Closing connection after handler failure");
                    let _ = peer.reply(Outbound::Close {
                        code: close_code::ERROR,
                        reason: "internal error".into(),
                    });
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer.label(), error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    state.write().await.disconnect(&peer);
    drop(peer);
    // The writer ends once every sender for this connection is gone.
    if tokio::time::timeout(std::time::Duration::from_secs(1), writer)
        .await
        .is_err()
    {
        tracing::debug!("Writer task did not finish promptly");
    }
}
