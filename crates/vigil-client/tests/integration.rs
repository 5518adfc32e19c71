//! End-to-end tests against an in-process WebSocket server.
//!
//! Each test binds a real listener on an ephemeral port and scripts the
//! server side of the conversation, so the full path — socket, auth
//! handshake, router, stores — is exercised the way a live assistant
//! process would drive it.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use vigil_client::{ConnectionFailure, ConnectionState, VigilClient};
use vigil_core::{PlanStatus, Role, StepStatus};
use vigil_settings::VigilSettings;

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(10);

fn settings_for(addr: SocketAddr) -> VigilSettings {
    let mut settings = VigilSettings::default();
    settings.server.url = format!("ws://{addr}/ws");
    settings.connection.max_reconnect_attempts = 3;
    settings.connection.base_delay_ms = 50;
    settings.connection.max_delay_ms = 200;
    settings
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Accept one socket and consume the client's auth frame, returning the
/// token it carried.
async fn accept_and_take_auth(listener: &TcpListener) -> (ServerSocket, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = accept_async(stream).await.unwrap();
    let frame = socket.next().await.unwrap().unwrap();
    let Message::Text(text) = frame else {
        panic!("expected a text auth frame, got {frame:?}");
    };
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "auth");
    let token = value["token"].as_str().unwrap().to_owned();
    (socket, token)
}

async fn send_json(socket: &mut ServerSocket, value: Value) {
    socket.send(Message::text(value.to_string())).await.unwrap();
}

async fn establish(socket: &mut ServerSocket) {
    send_json(
        socket,
        json!({
            "type": "connection_established",
            "user": {"id": "u1", "username": "ada", "auth_level": 2}
        }),
    )
    .await;
}

fn oob(event: &str, data: Value) -> Value {
    json!({"channel": "oob", "type": event, "data": data, "timestamp": "t"})
}

async fn wait_for_state(client: &VigilClient, state: ConnectionState) {
    let mut watch = client.connection();
    tokio::time::timeout(WAIT, watch.wait_for(|info| info.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state:?}"))
        .unwrap();
}

#[tokio::test]
async fn handshake_reaches_connected_and_records_identity() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, token) = accept_and_take_auth(&listener).await;
        assert_eq!(token, "secret-token");
        establish(&mut socket).await;
        // Hold the socket open until the test finishes.
        let _ = socket.next().await;
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("secret-token");
    wait_for_state(&client, ConnectionState::Connected).await;

    let mut conversation = client.conversation();
    let snapshot = tokio::time::timeout(WAIT, conversation.wait_for(|s| s.user.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.user.unwrap().username, "ada");

    drop(client);
    server.abort();
}

#[tokio::test]
async fn chat_and_lifecycle_events_reach_the_stores() {
    let (listener, addr) = bind().await;
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    let server = tokio::spawn(async move {
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        establish(&mut socket).await;

        // The client sends a chat turn; echo a reply plus a plan lifecycle.
        let frame = socket.next().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["content"], "run the report");

        send_json(
            &mut socket,
            json!({"type": "assistant_message", "content": "starting", "timestamp": "2026-08-28T09:00:00Z"}),
        )
        .await;
        send_json(
            &mut socket,
            oob(
                "planning.plan_started",
                json!({"plan_id": "p1", "description": "report", "steps": [{"description": "gather"}]}),
            ),
        )
        .await;
        send_json(&mut socket, oob("planning.step_started", json!({"step_id": "1"}))).await;
        send_json(
            &mut socket,
            oob("planning.step_completed", json!({"step_id": "1", "result": {"rows": 10}})),
        )
        .await;
        send_json(&mut socket, oob("search.query", json!({"query": "sales data"}))).await;

        done_rx.recv().await;
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("tok");
    wait_for_state(&client, ConnectionState::Connected).await;

    client.send_message("run the report").unwrap();

    let mut conversation = client.conversation();
    let snapshot = tokio::time::timeout(
        WAIT,
        conversation.wait_for(|s| s.turns.iter().any(|t| t.role == Role::Assistant)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snapshot.turns.len(), 2);
    assert!(!snapshot.busy);

    let mut plans = client.plans();
    let snapshot = tokio::time::timeout(
        WAIT,
        plans.wait_for(|s| {
            s.active
                .as_ref()
                .is_some_and(|p| p.steps[0].status == StepStatus::Completed)
        }),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    let active = snapshot.active.unwrap();
    assert_eq!(active.id.as_str(), "p1");
    assert_eq!(active.status, PlanStatus::InProgress);

    let mut telemetry = client.telemetry();
    let snapshot = tokio::time::timeout(WAIT, telemetry.wait_for(|s| s.search.queries == 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.search.recent[0].detail, "sales data");

    drop(done_tx);
    server.await.unwrap();
}

#[tokio::test]
async fn approval_flow_round_trips() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        establish(&mut socket).await;
        send_json(
            &mut socket,
            oob(
                "planning.plan_created",
                json!({"plan_id": "p1", "description": "buy it", "steps": [{"description": "pay"}]}),
            ),
        )
        .await;

        let frame = socket.next().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "plan_approval");
        assert_eq!(value["plan_id"], "p1");
        assert_eq!(value["approved"], true);

        send_json(
            &mut socket,
            json!({"type": "plan_approval_received", "plan_id": "p1", "approved": true}),
        )
        .await;
        let _ = socket.next().await;
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("tok");
    wait_for_state(&client, ConnectionState::Connected).await;

    let mut plans = client.plans();
    let pending = tokio::time::timeout(WAIT, plans.wait_for(|s| s.pending.is_some()))
        .await
        .unwrap()
        .unwrap()
        .pending
        .clone()
        .unwrap();
    client.decide_plan(&pending.id, true).unwrap();

    // Proposal cleared locally; the ack lands in the transcript.
    assert!(client.plans().borrow().pending.is_none());
    let mut conversation = client.conversation();
    let snapshot = tokio::time::timeout(
        WAIT,
        conversation.wait_for(|s| s.turns.iter().any(|t| t.role == Role::System)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert!(snapshot.turns[0].content.contains("approved"));

    drop(client);
    server.abort();
}

#[tokio::test]
async fn rejected_credential_is_terminal() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        send_json(
            &mut socket,
            json!({"type": "error", "error": "Invalid authentication token"}),
        )
        .await;
        let _ = socket.close(None).await;

        // A retry would show up as a second accept; fail the test if so.
        let second =
            tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(second.is_err(), "client retried a rejected credential");
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("expired");

    let mut watch = client.connection();
    let info = tokio::time::timeout(
        WAIT,
        watch.wait_for(|info| {
            matches!(info.last_error, Some(ConnectionFailure::AuthRejected(_)))
        }),
    )
    .await
    .expect("should settle on auth rejection")
    .unwrap()
    .clone();
    assert_eq!(info.state, ConnectionState::Disconnected);

    server.await.unwrap();
}

#[tokio::test]
async fn reconnects_after_a_dropped_socket() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        // First epoch: establish, then drop the socket abruptly.
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        establish(&mut socket).await;
        drop(socket);

        // Second epoch: the client comes back with the same token.
        let (mut socket, token) = accept_and_take_auth(&listener).await;
        assert_eq!(token, "tok");
        establish(&mut socket).await;
        let _ = socket.next().await;
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("tok");
    wait_for_state(&client, ConnectionState::Connected).await;

    // Ride through the drop and the backoff delay.
    let mut watch = client.connection();
    tokio::time::timeout(
        WAIT,
        watch.wait_for(|info| info.state != ConnectionState::Connected),
    )
    .await
    .expect("should observe the drop")
    .unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    // A successful open resets the attempt counter.
    assert_eq!(client.connection().borrow().attempt, 0);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn explicit_disconnect_is_final() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        establish(&mut socket).await;
        // Drain until the client closes.
        while let Some(Ok(frame)) = socket.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
        }
        let second =
            tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(second.is_err(), "client reconnected after an explicit disconnect");
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("tok");
    wait_for_state(&client, ConnectionState::Connected).await;

    client.disconnect();
    wait_for_state(&client, ConnectionState::Disconnected).await;
    assert!(client.send_message("hello").is_err());

    server.await.unwrap();
}

#[tokio::test]
async fn question_flow_answers_over_the_wire() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = accept_and_take_auth(&listener).await;
        establish(&mut socket).await;
        send_json(
            &mut socket,
            oob(
                "planning.needs_input",
                json!({
                    "interaction_id": "i1",
                    "plan_id": "p1",
                    "question": "Proceed with the purchase?",
                    "type": "approval",
                    "risk_level": "high",
                    "timeout_ms": 60000,
                    "suggested_actions": ["yes", "no"]
                }),
            ),
        )
        .await;

        let frame = socket.next().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "interaction_response");
        assert_eq!(value["interaction_id"], "i1");
        assert_eq!(value["action"], "yes");
        let _ = socket.next().await;
    });

    let client = VigilClient::new(&settings_for(addr));
    client.connect("tok");
    wait_for_state(&client, ConnectionState::Connected).await;

    let mut interactions = client.interactions();
    let live = tokio::time::timeout(WAIT, interactions.wait_for(|s| s.live.is_some()))
        .await
        .unwrap()
        .unwrap()
        .live
        .clone()
        .unwrap();
    assert!(live.remaining().is_some());

    client
        .answer_question(
            &live.interaction.id,
            vigil_core::InteractionResponse {
                action: "yes".into(),
                value: None,
            },
        )
        .unwrap();
    assert!(client.interactions().borrow().live.is_none());

    drop(client);
    server.abort();
}
