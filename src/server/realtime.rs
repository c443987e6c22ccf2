//! Realtime websocket channel. Connections are logged and otherwise idle.

use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::{debug, info};

/// `GET /socket`
pub async fn socket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer))
}

async fn handle_socket(mut socket: WebSocket, peer: SocketAddr) {
    info!(peer = %peer.ip(), "Socket connected");

    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }

    debug!(peer = %peer.ip(), "Socket closed");
}
