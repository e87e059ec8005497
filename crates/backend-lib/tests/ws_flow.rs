// ============================
// crates/backend-lib/tests/ws_flow.rs
// ============================
//! End-to-end flows over a real socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use backend_lib::attendance::{AttendanceRecord, AttendanceSink, FlatFileAttendance};
use backend_lib::{config::Settings, ws_router, AppState};
use futures_util::{SinkExt, StreamExt};
use liveclass_common::{RoomSnapshot, ServerEvent};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(Settings::default()).unwrap());
    let app = ws_router::create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    stream
}

async fn send(client: &mut Client, value: serde_json::Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next server event, skipping heartbeat pings
async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timed out waiting for a server event")
            .expect("Stream ended")
            .expect("WebSocket error");
        let Message::Text(text) = message else {
            continue;
        };
        let event: ServerEvent = serde_json::from_str(text.as_str()).unwrap();
        if !matches!(event, ServerEvent::Ping { .. }) {
            return event;
        }
    }
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = ws_router::create_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_classroom_flow() {
    let (addr, state) = setup_server().await;

    // Teacher joins with the legacy field names
    let mut teacher = connect(addr).await;
    send(
        &mut teacher,
        json!({"event": "join-room", "data": {
            "roomId": "math", "userId": "teacher", "userName": "Mr. Euler",
            "isEducator": true, "roomName": "Geometry"
        }}),
    )
    .await;
    assert_eq!(next_event(&mut teacher).await, ServerEvent::ExistingUsers { users: vec![] });
    match next_event(&mut teacher).await {
        ServerEvent::RoomUpdate {
            total_users,
            room_name,
            ..
        } => {
            assert_eq!(total_users, 1);
            assert_eq!(room_name, "Geometry");
        },
        other => panic!("Expected room-update, got {other:?}"),
    }

    let mut student = connect(addr).await;
    send(
        &mut student,
        json!({"event": "join-room", "data": {
            "roomId": "math", "participantId": "s1", "displayName": "Sam"
        }}),
    )
    .await;
    match next_event(&mut student).await {
        ServerEvent::ExistingUsers { users } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].participant_id, "teacher");
            assert!(users[0].is_owner);
        },
        other => panic!("Expected existing-users, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut student).await,
        ServerEvent::RoomUpdate { total_users: 2, .. }
    ));
    assert_eq!(
        next_event(&mut teacher).await,
        ServerEvent::UserConnected {
            participant_id: "s1".to_string(),
            display_name: "Sam".to_string(),
            is_owner: false,
        }
    );
    assert!(matches!(
        next_event(&mut teacher).await,
        ServerEvent::RoomUpdate { total_users: 2, .. }
    ));

    // Spoofed `from` is replaced by the bound participant
    send(
        &mut teacher,
        json!({"event": "signal", "data": {"to": "s1", "from": "mallory", "signal": {"type": "offer", "sdp": "v=0"}}}),
    )
    .await;
    assert_eq!(
        next_event(&mut student).await,
        ServerEvent::Signal {
            signal: json!({"type": "offer", "sdp": "v=0"}),
            from: "teacher".to_string(),
        }
    );

    // Garbage and invalid events are dropped without closing the socket
    student
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    send(
        &mut student,
        json!({"event": "send-message", "data": {"roomId": "math", "message": "   "}}),
    )
    .await;
    send(
        &mut student,
        json!({"event": "send-message", "data": {"roomId": "math", "message": "hello", "isEducator": true}}),
    )
    .await;
    for client in [&mut teacher, &mut student] {
        match next_event(client).await {
            ServerEvent::NewMessage {
                user_name,
                message,
                is_educator,
                ..
            } => {
                assert_eq!(user_name, "Sam");
                assert_eq!(message, "hello");
                assert!(!is_educator);
            },
            other => panic!("Expected new-message, got {other:?}"),
        }
    }

    let (status, body) = get(&state, "/rooms/math").await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: RoomSnapshot = serde_json::from_value(body).unwrap();
    assert_eq!(snapshot.total_users(), 2);
    assert_eq!(snapshot.owner.as_deref(), Some("teacher"));

    // Closing the socket is a disconnect
    student.close(None).await.unwrap();
    assert_eq!(
        next_event(&mut teacher).await,
        ServerEvent::UserDisconnected {
            participant_id: "s1".to_string(),
            display_name: "Sam".to_string(),
        }
    );
    assert!(matches!(
        next_event(&mut teacher).await,
        ServerEvent::RoomUpdate { total_users: 1, .. }
    ));

    send(&mut teacher, json!({"event": "leave-room", "data": {"roomId": "math"}})).await;
    send(&mut teacher, json!({"event": "get-room-info", "data": {"roomId": "math"}})).await;
    assert_eq!(
        next_event(&mut teacher).await,
        ServerEvent::RoomNotFound {
            room_id: "math".to_string()
        }
    );
}

#[tokio::test]
async fn test_http_routes() {
    let (_addr, state) = setup_server().await;

    let (status, body) = get(&state, "/rooms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = get(&state, "/rooms/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ROOM_001");

    let response = ws_router::create_router(state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_attendance_route() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(FlatFileAttendance::new(temp_dir.path()).unwrap());
    let state = Arc::new(AppState::with_attendance(Settings::default(), sink.clone()));

    let (status, body) = get(&state, "/rooms/history/attendance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let record = AttendanceRecord {
        room_id: "history".to_string(),
        room_name: "History".to_string(),
        recorded_at: chrono::Utc::now(),
        participants: vec![],
    };
    sink.record(&record).await.unwrap();

    let (status, body) = get(&state, "/rooms/history/attendance").await;
    assert_eq!(status, StatusCode::OK);
    let records: Vec<AttendanceRecord> = serde_json::from_value(body).unwrap();
    assert_eq!(records, vec![record]);
}
