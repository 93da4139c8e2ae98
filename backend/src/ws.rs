//! The socket endpoint.
//!
//! Clients connect with `Authorization: SessionKey <id>|<token>` and
//! `Game-ID` headers; both are validated before the upgrade so header
//! errors surface as normal JSON error responses. After the upgrade the
//! socket is a dumb pipe: inbound text frames become hub commands,
//! outbound events arrive on a per-socket channel and are forwarded in
//! order. A `game_disconnect` event closes the pipe from our side.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use shared::{ClientEvent, ServerEvent};

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::hub::HubCommand;
use crate::models::{unix_now, Game, Session, User};
use crate::state::AppState;

pub async fn socket_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    match authorize(&state, &headers).await {
        Ok((session, user, game)) => {
            let user_id = user.id;
            let game_id = game.id;
            let session_expires_at = session.expires_at;
            ws.on_upgrade(move |socket| {
                run_socket(state, socket, user_id, game_id, session_expires_at)
            })
        }
        Err(err) => err.into_response(),
    }
}

/// Validate the connect headers: session key, game id, membership.
async fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<(Session, User, Game)> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok());
    let (session_id, token) = auth::parse_session_header(auth_header)?;
    let (session, user) =
        auth::validate_session_key(&state.store, session_id, &token).await?;

    let game_id: i64 = headers
        .get("Game-ID")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::BadGameIdHeader)?
        .parse()
        .map_err(|_| ApiError::BadGameIdHeader)?;
    let game = state
        .store
        .game(game_id)
        .await?
        .ok_or(ApiError::GameNotFound)?;
    if game.side_of(user.id).is_none() {
        return Err(ApiError::NotAParticipant);
    }
    if game.is_finished() {
        return Err(ApiError::GameAlreadyEnded);
    }
    Ok((session, user, game))
}

async fn run_socket(
    state: AppState,
    socket: WebSocket,
    user_id: i64,
    game_id: i64,
    session_expires_at: i64,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let socket_id = state.sockets.register(user_id, tx.clone());
    tracing::debug!(user_id, game_id, socket_id, "socket connected");

    let hub = match state.hubs.hub(game_id).await {
        Ok(hub) => hub,
        Err(err) => {
            // The game finished between the header check and now.
            tracing::debug!(game_id, %err, "hub unavailable at connect");
            state.sockets.unregister(user_id, socket_id);
            return;
        }
    };
    if hub
        .send(HubCommand::Connect {
            user_id,
            socket: tx.clone(),
        })
        .await
        .is_err()
    {
        state.sockets.unregister(user_id, socket_id);
        return;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let closing = matches!(event, ServerEvent::GameDisconnect { .. });
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(%err, "event serialisation failed");
                    }
                }
                if closing {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        // A session expiring mid-connection disconnects at
                        // the next event boundary.
                        if unix_now() >= session_expires_at {
                            let expired = ApiError::SessionExpired;
                            let frame = ServerEvent::BadRequest {
                                error: expired.code(),
                                message: expired.public_message(),
                            };
                            if let Ok(text) = serde_json::to_string(&frame) {
                                let _ = sink.send(Message::Text(text)).await;
                            }
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        handle_frame(&hub, &tx, user_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(user_id, game_id, %err, "socket receive error");
                        break;
                    }
                }
            }
        }
    }

    // A dropped socket does not forfeit: the hub keeps running and the
    // clocks keep ticking against the side to move.
    state.sockets.unregister(user_id, socket_id);
    tracing::debug!(user_id, game_id, socket_id, "socket closed");
}

async fn handle_frame(
    hub: &mpsc::Sender<HubCommand>,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    user_id: i64,
    text: &str,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            let _ = hub.send(HubCommand::Event { user_id, event }).await;
        }
        Err(_) => {
            // Distinguish unparseable JSON from a well-formed object that
            // is not a known event.
            let error = if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                ApiError::WrongParameters
            } else {
                ApiError::InvalidJson
            };
            let _ = tx.send(ServerEvent::BadRequest {
                error: error.code(),
                message: error.public_message(),
            });
        }
    }
}
