//! Chat over HTTP and the real-time WebSocket channel

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{list, ok, ApiResult};
use crate::app_state::AppState;
use crate::error::{MarketError, MarketResult};
use crate::middleware::auth::{user_from_token, AuthenticatedUser};
use crate::models::{ChatMessage, ClientFrame, Conversation, ListResponse, ServerFrame};
use crate::services::RoomId;

const OUTBOUND_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Resolve a client room id and check the caller may use it.
async fn authorize_room(state: &AppState, user_id: Uuid, raw: &str) -> MarketResult<RoomId> {
    let room = RoomId::parse(raw, user_id)?;
    match room {
        RoomId::Order(order_id) => {
            state.market.order_for(user_id, order_id).await?;
        }
        RoomId::Direct(..) => {
            let other = room
                .counterpart(user_id)
                .ok_or_else(|| MarketError::forbidden("not a member of this room"))?;
            state.market.profile(other).await?;
        }
    }
    Ok(room)
}

pub async fn conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<ListResponse<Conversation>> {
    let mut order_ids: Vec<Uuid> = state
        .market
        .orders_as_buyer(user.id)
        .await
        .into_iter()
        .map(|o| o.id)
        .collect();
    order_ids.extend(state.market.orders_as_seller(user.id).await.into_iter().map(|o| o.id));
    list(state.chat.conversations(user.id, &order_ids).await)
}

pub async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(room_id): Path<String>,
) -> ApiResult<ListResponse<ChatMessage>> {
    let room = authorize_room(&state, user.id, &room_id).await?;
    list(state.chat.history(room).await)
}

pub async fn post_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(room_id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> ApiResult<ChatMessage> {
    let room = authorize_room(&state, user.id, &room_id).await?;
    ok(state.chat.post(room, user.id, payload.content).await?)
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(room_id): Path<String>,
) -> ApiResult<MarkReadResponse> {
    let room = authorize_room(&state, user.id, &room_id).await?;
    let updated = state.chat.mark_read(room, user.id).await?;
    ok(MarkReadResponse { updated })
}

/// GET /ws?token=: upgrade to the real-time chat channel
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> MarketResult<impl IntoResponse> {
    let user = user_from_token(&state, &params.token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.id)))
}

fn forward_room(mut live: broadcast::Receiver<ChatMessage>, outbound: mpsc::Sender<ServerFrame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match live.recv().await {
                Ok(message) => {
                    if outbound.send(ServerFrame::Message(message)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "chat subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    tracing::info!(%user_id, "chat socket connected");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashMap<RoomId, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Join { room_id }) => match authorize_room(&state, user_id, &room_id).await {
                Ok(room) => {
                    if !joined.contains_key(&room) {
                        let live = state.chat.subscribe(room).await;
                        joined.insert(room, forward_room(live, outbound.clone()));
                    }
                    Some(ServerFrame::Joined { room_id: room.key() })
                }
                Err(err) => Some(ServerFrame::Error {
                    message: err.to_string(),
                }),
            },
            Ok(ClientFrame::Message { room_id, content }) => {
                let posted = match authorize_room(&state, user_id, &room_id).await {
                    Ok(room) => state.chat.post(room, user_id, content).await.map(|m| (room, m)),
                    Err(err) => Err(err),
                };
                match posted {
                    // joined rooms echo through the subscription
                    Ok((room, _)) if joined.contains_key(&room) => None,
                    Ok((_, message)) => Some(ServerFrame::Message(message)),
                    Err(err) => Some(ServerFrame::Error {
                        message: err.to_string(),
                    }),
                }
            }
            Err(err) => Some(ServerFrame::Error {
                message: format!("malformed frame: {err}"),
            }),
        };

        if let Some(frame) = reply {
            if outbound.send(frame).await.is_err() {
                break;
            }
        }
    }

    for (_, forwarder) in joined {
        forwarder.abort();
    }
    drop(outbound);
    let _ = writer.await;
    tracing::info!(%user_id, "chat socket closed");
}
