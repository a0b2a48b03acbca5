//! Live fleet feed over WebSocket.
//!
//! A client first receives a `sync` frame with the whole fleet, then every
//! broadcast [`FleetEvent`]. Clients may send [`FleetAction`]s back.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::routes::AppState;
use crate::fleet::{ActivityEntry, FleetManager, FleetStats};
use crate::worker::{WorkerId, WorkerView};

/// Activity entries included in the sync frame.
const SYNC_ACTIVITY: usize = 20;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SyncFrame {
    Sync {
        workers: Vec<WorkerView>,
        stats: FleetStats,
        activity: Vec<ActivityEntry>,
    },
}

/// Commands a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FleetAction {
    Start { worker_id: WorkerId },
    Pause { worker_id: WorkerId },
    Stop { worker_id: WorkerId },
    Delete { worker_id: WorkerId },
    StartAll,
    StopAll,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.fleet))
}

/// Serialize and send one frame. Returns `false` once the client is gone.
async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Dropping unserializable frame");
            true
        }
    }
}

/// Send the whole fleet state, used on connect and after a lag.
async fn send_sync(socket: &mut WebSocket, fleet: &FleetManager) -> bool {
    let frame = fleet
        .read(|f| SyncFrame::Sync {
            workers: f.views(),
            stats: f.stats(),
            activity: f.activity(SYNC_ACTIVITY),
        })
        .await;
    send_json(socket, &frame).await
}

async fn handle_socket(mut socket: WebSocket, fleet: Arc<FleetManager>) {
    // Subscribe first so events raised while the sync is built are not lost.
    let mut rx = fleet.subscribe();
    if !send_sync(&mut socket, &fleet).await {
        warn!("Client left before the initial sync");
        return;
    }
    info!("WebSocket client synced");

    loop {
        let open = tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => send_json(&mut socket, &event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Feed client fell behind, resyncing");
                    send_sync(&mut socket, &fleet).await
                }
                Err(RecvError::Closed) => false,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&text, &fleet).await;
                    true
                }
                Some(Ok(Message::Ping(payload))) => {
                    socket.send(Message::Pong(payload)).await.is_ok()
                }
                Some(Ok(Message::Close(_))) | None => false,
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive failed");
                    false
                }
                Some(Ok(_)) => true,
            },
        };
        if !open {
            break;
        }
    }

    info!("WebSocket client disconnected");
}

async fn handle_client_message(text: &str, fleet: &FleetManager) {
    let action = match serde_json::from_str::<FleetAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            return;
        }
    };

    debug!(?action, "WS action");
    fleet
        .write(|f| match &action {
            FleetAction::Start { worker_id } => {
                f.start_worker(worker_id);
            }
            FleetAction::Pause { worker_id } => {
                f.pause_worker(worker_id);
            }
            FleetAction::Stop { worker_id } => {
                f.stop_worker(worker_id);
            }
            FleetAction::Delete { worker_id } => {
                f.delete_worker(worker_id);
            }
            FleetAction::StartAll => {
                f.start_all();
            }
            FleetAction::StopAll => {
                f.stop_all();
            }
        })
        .await;
}
