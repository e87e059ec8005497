// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP + WebSocket surface.
use crate::attendance::AttendanceRecord;
use crate::coordinator::CoordinatorHandle;
use crate::error::AppError;
use crate::metrics as keys;
use crate::registry::ConnectionId;
use crate::validation;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use liveclass_common::{ClientEvent, RoomSnapshot, ServerEvent};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.server.allowed_origins);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}", get(room_info))
        .route("/rooms/{room_id}/attendance", get(room_attendance))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    cors.allow_origin(origins)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "Healthy"
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RoomSnapshot>>, AppError> {
    Ok(Json(state.coordinator.rooms().await?))
}

async fn room_info(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = state.coordinator.snapshot(&room_id).await?;
    snapshot.map(Json).ok_or(AppError::RoomNotFound(room_id))
}

async fn room_attendance(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    validation::validate_room_id(&room_id).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(Json(state.attendance.records(&room_id).await?))
}

/// Handle WebSocket upgrades
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let coordinator = state.coordinator.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: CoordinatorHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = match coordinator.connect(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Could not register connection");
            let _ = sender.send(Message::Close(None)).await;
            return;
        },
    };
    tracing::info!(%connection_id, "WebSocket connected");

    // Drain coordinator output into the socket. The channel closes when the
    // coordinator forgets this connection, including heartbeat reaps.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize server event");
                    continue;
                },
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let recv_coordinator = coordinator.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let delivered = match message {
                Message::Text(text) => handle_text(&recv_coordinator, connection_id, text.as_str()),
                Message::Binary(_) => {
                    tracing::debug!(%connection_id, "Ignoring binary frame");
                    recv_coordinator.touch(connection_id)
                },
                Message::Ping(_) | Message::Pong(_) => recv_coordinator.touch(connection_id),
                Message::Close(_) => break,
            };
            if delivered.is_err() {
                break;
            }
        }
    });

    // Wait for either side to finish
    tokio::select! {
        _ = (&mut recv_task) => send_task.abort(),
        _ = (&mut send_task) => recv_task.abort(),
    };

    let _ = coordinator.disconnect(connection_id);
    tracing::info!(%connection_id, "WebSocket closed");
}

/// Parse, validate and forward one text frame. Bad frames still count as liveness.
fn handle_text(
    coordinator: &CoordinatorHandle,
    connection_id: ConnectionId,
    text: &str,
) -> Result<(), AppError> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(%connection_id, error = %e, "Dropping malformed event");
            counter!(keys::EVENT_DROPPED).increment(1);
            return coordinator.touch(connection_id);
        },
    };

    if let Err(e) = validation::validate_client_event(&event) {
        tracing::warn!(%connection_id, event = event.name(), error = %e, "Dropping invalid event");
        counter!(keys::EVENT_DROPPED).increment(1);
        return coordinator.touch(connection_id);
    }

    coordinator.dispatch(connection_id, event)
}
