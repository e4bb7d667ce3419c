//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::http::middleware::{extract_token, verify_jwt, AuthError, TokenSource};
use crate::rooms::{Identity, Session, OUTBOUND_CAPACITY};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::dispatch::{dispatch, on_disconnect};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Identity token, when not sent as a subprotocol
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The token is checked before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AuthError> {
    let source = extract_token(query.token.as_deref(), &headers).ok_or(AuthError::MissingToken)?;
    let identity = verify_jwt(source.token(), &state.config.jwt_secret).map_err(|e| {
        warn!(error = %e, "WebSocket auth failed");
        e
    })?;

    info!(user_id = %identity.id, "WebSocket upgrade for authenticated user");
    let ws = match source {
        // Browsers fail the handshake unless the offered subprotocol is echoed
        TokenSource::Protocol(token) => ws.protocols([token]),
        TokenSource::Query(_) | TokenSource::Bearer(_) => ws,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_CAPACITY);

    let session = Session::new(identity, outbound_tx);
    let registry = state.registry.clone();
    registry.attach_session(&session);
    info!(conn_id = %session.conn_id, user_id = %session.identity.id, "New WebSocket connection");

    // Writer task: session queue -> WebSocket
    let writer_conn = session.conn_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %writer_conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new();
    let user_id = session.identity.id.clone();

    // Reader loop: WebSocket -> room state
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id = %user_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => dispatch(&registry, &session, client_msg),
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        session.send(ServerMsg::RoomError {
                            message: "Malformed message".to_string(),
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // A dropped connection is a leave
    on_disconnect(&registry, &session);
    writer_handle.abort();

    info!(conn_id = %session.conn_id, user_id = %user_id, "WebSocket connection closed");
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
