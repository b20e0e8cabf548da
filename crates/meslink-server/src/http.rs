//! The operator-facing HTTP/WebSocket surface.
//!
//! Read endpoints snapshot coordinator state; command endpoints validate
//! through the coordinator and surface rejections as structured JSON with
//! a meaningful status code. `/ws` streams the mirrored wire traffic: a
//! connecting observer first receives an `initial_state` snapshot, then
//! every exchange as it happens. Observers are lossy by design — a slow
//! consumer loses events, never stalls the session.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use meslink_core::errors::CommandError;
use meslink_core::ids::ChannelId;

use crate::broadcast::BroadcastHub;
use crate::controller::ControllerHandle;
use crate::coordinator::{Coordinator, LinkStatus};

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session coordinator.
    pub coordinator: Arc<Coordinator>,
    /// Observer fan-out hub.
    pub hub: Arc<BroadcastHub>,
    /// Controller connection handle, for the socket count.
    pub controller: ControllerHandle,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/channels", get(channels_handler))
        .route("/api/cmd/start", post(start_handler))
        .route("/api/cmd/stop", post(stop_handler))
        .route("/api/cmd/pause", post(pause_handler))
        .route("/api/cmd/resume", post(resume_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Request body of `/api/cmd/start`.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Target channel, canonical form (`CH005`).
    pub channel: String,
    /// Barcode of the cell under test.
    #[serde(default)]
    pub barcode: String,
    /// Process (recipe) name.
    #[serde(default)]
    pub process: String,
    /// Result data path.
    #[serde(default)]
    pub data_path: String,
}

/// Request body of the channel-only command endpoints.
#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    /// Target channel, canonical form.
    pub channel: String,
}

/// Uniform command outcome shape.
#[derive(Debug, Serialize)]
struct CommandOutcome {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `/api/status` response: link status plus the socket-level view.
#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    link: LinkStatus,
    socket_connections: usize,
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(StatusResponse {
        link: state.coordinator.link_status(),
        socket_connections: state.controller.connection_count(),
    })
}

async fn channels_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.coordinator.channels())
}

async fn start_handler(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<StartRequest>,
) -> impl IntoResponse {
    let channel = ChannelId::new(req.channel);
    command_response(state.coordinator.start(
        &channel,
        &req.barcode,
        &req.process,
        &req.data_path,
    ))
}

async fn stop_handler(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<ChannelRequest>,
) -> impl IntoResponse {
    command_response(state.coordinator.stop(&ChannelId::new(req.channel)))
}

async fn pause_handler(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<ChannelRequest>,
) -> impl IntoResponse {
    command_response(state.coordinator.pause(&ChannelId::new(req.channel)))
}

async fn resume_handler(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<ChannelRequest>,
) -> impl IntoResponse {
    command_response(state.coordinator.resume(&ChannelId::new(req.channel)))
}

fn command_response(result: Result<(), CommandError>) -> impl IntoResponse {
    match result {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(CommandOutcome {
                ok: true,
                error: None,
            }),
        ),
        Err(e) => (
            command_status(&e),
            axum::Json(CommandOutcome {
                ok: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn command_status(error: &CommandError) -> StatusCode {
    match error {
        CommandError::UnknownChannel(_) => StatusCode::NOT_FOUND,
        CommandError::NotLinked | CommandError::IllegalState { .. } => StatusCode::CONFLICT,
        CommandError::SendFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve one observer: initial snapshot first, then the live mirror feed.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (observer_id, mut rx) = state.hub.register();
    info!(observer_id = %observer_id, "observer connected");

    let snapshot = json!({
        "type": "initial_state",
        "link": state.coordinator.link_status(),
        "channels": state.coordinator.channels(),
    });
    if socket
        .send(Message::Text(snapshot.to_string().into()))
        .await
        .is_err()
    {
        state.hub.unregister(&observer_id);
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(json) = event else { break };
                if socket.send(Message::Text(json.as_str().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Observers are read-only; inbound frames are drained
                    // so pings and close frames are processed.
                    Some(Ok(msg)) => debug!(observer_id = %observer_id, ?msg, "ignoring observer message"),
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.hub.unregister(&observer_id);
    info!(observer_id = %observer_id, "observer disconnected");
}
