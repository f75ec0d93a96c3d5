//! WebSocket-Transport
//!
//! Jeder Text-Frame ist eine Befehlszeile, jede ausgehende Nachricht ein
//! Text-Frame. Ping/Pong auf WebSocket-Ebene erledigt axum selbst.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{future, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::BridgeError;
use crate::server_state::BridgeState;
use crate::session::ClientSession;
use crate::transport::Transport;

#[derive(Clone)]
struct WsZustand {
    state: Arc<BridgeState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Router mit dem WebSocket-Endpunkt unter `/`
pub fn ws_router(state: Arc<BridgeState>, shutdown_rx: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(WsZustand { state, shutdown_rx })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(zustand): State<WsZustand>,
) -> Response {
    let Some(platz) = zustand.state.platz_reservieren() else {
        tracing::warn!(peer = %peer_addr, "Server voll – WebSocket abgelehnt");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let max_laenge = zustand.state.config.max_zeilen_laenge;
    ws.max_message_size(max_laenge)
        .on_upgrade(move |socket| async move {
            let _platz = platz;
            let session = ClientSession::neu(Arc::clone(&zustand.state), peer_addr.to_string());
            session
                .verarbeiten(ws_transport(socket), zustand.shutdown_rx)
                .await;
        })
}

/// Wandelt einen WebSocket in einen [`Transport`]
pub fn ws_transport(socket: WebSocket) -> Transport {
    let (ws_tx, ws_rx) = socket.split();

    let quelle = ws_rx
        .take_while(|nachricht| future::ready(!matches!(nachricht, Ok(Message::Close(_)))))
        .filter_map(|nachricht| {
            future::ready(match nachricht {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(daten)) => String::from_utf8(daten).ok().map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(BridgeError::Io(std::io::Error::other(e)))),
            })
        })
        .boxed();

    let senke = ws_tx
        .sink_map_err(|e| BridgeError::Io(std::io::Error::other(e)))
        .with(|zeile: String| future::ready(Ok::<_, BridgeError>(Message::Text(zeile))));

    Transport::neu(quelle, Box::pin(senke))
}

/// WebSocket-Server
pub struct WsServer {
    state: Arc<BridgeState>,
    listener: TcpListener,
}

impl WsServer {
    pub async fn binden(state: Arc<BridgeState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Bedient WebSocket-Verbindungen bis zum Shutdown-Signal
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "WebSocket-Server gestartet");

        let app = ws_router(self.state, shutdown_rx.clone());
        let mut signal_rx = shutdown_rx;
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while signal_rx.changed().await.is_ok() {
                if *signal_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

        tracing::info!("WebSocket-Server gestoppt");
        Ok(())
    }
}
