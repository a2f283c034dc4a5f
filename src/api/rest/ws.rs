use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeFilter {
    pub session_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<NoticeFilter>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: NoticeFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut notices = BroadcastStream::new(state.notifier.subscribe());

    info!(session_id = ?filter.session_id, "notification client connected");

    let send_task = tokio::spawn(async move {
        while let Some(item) = notices.next().await {
            let notice = match item {
                Ok(notice) => notice,
                Err(err) => {
                    warn!(error = %err, "notification client lagging");
                    continue;
                }
            };

            if filter
                .session_id
                .is_some_and(|session_id| session_id != notice.session_id)
            {
                continue;
            }

            let json = match serde_json::to_string(&notice) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize verification notice");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("notification client disconnected");
}
