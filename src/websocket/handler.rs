use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for messages addressed to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Register the session and let the engine create its ledger;
    // the engine answers with init_status through the registry.
    let session = state.registry.register(tx);
    state.engine.connect(session);
    info!("WebSocket client connected: {}", session);

    // Forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", session, text);
                handle_message(&state, session, &text);
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnecting: {}", session);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by axum
                debug!("Received ping from {}", session);
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", session, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up: drop the outbound channel and the ledger
    state.registry.unregister(session);
    state.engine.disconnect(session);
    send_task.abort();
    info!("WebSocket client disconnected: {}", session);
}

fn handle_message(state: &AppState, session: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            state.registry.send_to(
                session,
                &ServerMessage::Error {
                    error: format!("Invalid message: {}", e),
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::StartRound => {
            state.engine.start_round(session);
        }
        ClientMessage::Trade { action, symbol } => {
            state.engine.trade(session, action, symbol);
        }
    }
}
