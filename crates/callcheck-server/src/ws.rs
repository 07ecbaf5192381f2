//! WebSocket handler for live test status
//!
//! Clients connect to /api/v1/ws, receive the current snapshot, then one
//! message per orchestrator transition. A client that falls behind the
//! event channel gets a fresh snapshot in place of the events it missed.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use callcheck_core::probe::transport::ProbeTransport;
use callcheck_core::session::{lock_session, OrchestratorSnapshot, TestEvent, TestOrchestrator};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Messages pushed to clients
#[derive(Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
enum PushMessage<'a> {
    Snapshot(&'a OrchestratorSnapshot),
    Event(&'a TestEvent),
}

/// WebSocket upgrade handler
pub async fn ws_handler<T: ProbeTransport + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<T>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Snapshot JSON and a subscription taken under one lock, so no event is
/// missed between them
fn subscribe_with_snapshot(
    session: &Mutex<TestOrchestrator>,
) -> (Option<String>, broadcast::Receiver<TestEvent>) {
    let session = lock_session(session);
    let snapshot = session.snapshot();
    let rx = session.subscribe();
    drop(session);
    (serde_json::to_string(&PushMessage::Snapshot(&snapshot)).ok(), rx)
}

/// Next message for the client, `None` once the session is gone
///
/// After a lag the receiver is replaced by a fresh subscription and the
/// client gets the current snapshot instead of the dropped events.
async fn next_push(
    rx: &mut broadcast::Receiver<TestEvent>,
    session: &Mutex<TestOrchestrator>,
) -> Option<String> {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&PushMessage::Event(&event)) {
                    return Some(json);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "ws_client_lagged");
                let (snapshot, resubscribed) = subscribe_with_snapshot(session);
                *rx = resubscribed;
                if snapshot.is_some() {
                    return snapshot;
                }
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Handle an individual WebSocket connection
async fn handle_ws<T>(socket: WebSocket, state: AppState<T>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let session = Arc::clone(&state.session);
    let (initial, mut rx) = subscribe_with_snapshot(&session);

    if let Some(json) = initial {
        let _ = ws_sender.send(Message::Text(json.into())).await;
    }

    // Spawn task to forward orchestrator events to this client
    let mut send_task = tokio::spawn(async move {
        while let Some(json) = next_push(&mut rx, &session).await {
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Spawn task to handle incoming messages (pings, close)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::debug!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use callcheck_core::probe::scripted::ScriptedTransport;
    use callcheck_core::session::TestId;

    #[tokio::test]
    async fn test_subscription_sees_later_transitions() {
        let state = AppState::with_new_session(ScriptedTransport::new(), ServerConfig::default());
        let (initial, mut rx) = subscribe_with_snapshot(&state.session);

        let initial: serde_json::Value = serde_json::from_str(&initial.unwrap()).unwrap();
        assert_eq!(initial["type"], "snapshot");
        assert_eq!(initial["payload"]["records"].as_array().unwrap().len(), TestId::ALL.len());

        lock_session(&state.session).start(TestId::Ping).unwrap();
        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(PushMessage::Event(&event)).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["payload"]["event"], "status_changed");
        assert_eq!(json["payload"]["test_id"], "ping");
    }

    #[tokio::test]
    async fn test_lagged_client_is_resynced_with_snapshot() {
        let state = AppState::with_new_session(ScriptedTransport::new(), ServerConfig::default());
        let (_, mut rx) = subscribe_with_snapshot(&state.session);

        {
            let mut session = lock_session(&state.session);
            for _ in 0..100 {
                session.start(TestId::Ping).unwrap();
                session.fail(TestId::Ping, Some("unreachable".into())).unwrap();
            }
        }

        let push = next_push(&mut rx, &state.session).await.unwrap();
        let push: serde_json::Value = serde_json::from_str(&push).unwrap();
        assert_eq!(push["type"], "snapshot");
        let ping = push["payload"]["records"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["testId"] == "ping")
            .unwrap();
        assert_eq!(ping["status"], "failed");

        // Subscription picks up from the snapshot
        lock_session(&state.session).start(TestId::Ping).unwrap();
        let push = next_push(&mut rx, &state.session).await.unwrap();
        let push: serde_json::Value = serde_json::from_str(&push).unwrap();
        assert_eq!(push["type"], "event");
        assert_eq!(push["payload"]["status"], "running");
    }

    #[tokio::test]
    async fn test_closed_session_ends_push_stream() {
        let session = Mutex::new(TestOrchestrator::default());
        let (_, mut rx) = subscribe_with_snapshot(&session);
        drop(session);
        let session = Mutex::new(TestOrchestrator::default());
        assert_eq!(next_push(&mut rx, &session).await, None);
    }
}
