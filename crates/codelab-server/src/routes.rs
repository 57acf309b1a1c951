//! HTTP and WebSocket routes for the codelab server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use codelab_core::{ScriptRunner, StopHandle};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as TokioMutex;
use tower_http::cors::CorsLayer;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionHandle;

/// Application state shared across handlers.
pub struct AppState {
    /// Active sandbox session.
    pub session: SessionHandle,
    /// Worker runner. Deliberately outside the session lock: the run
    /// blocks on worker IPC for up to the time limit, and edits, tab
    /// switches, and state reads must keep working in the meantime.
    pub runner: Arc<StdMutex<ScriptRunner>>,
    /// Stop handle for the in-flight run, so a stop request never waits
    /// on the runner lock.
    pub stop_handle: Arc<TokioMutex<Option<StopHandle>>>,
    /// Run gate: a new run may dispatch only while this is false.
    /// AtomicBool so duplicate run requests are dropped without locks.
    pub running: Arc<AtomicBool>,
    /// Advisory stop flag mirroring the client's stop requests.
    pub stop_requested: Arc<AtomicBool>,
}

/// Lock the runner, recovering from a poisoned mutex.
///
/// The runner holds no invariants a panicked run could break: at worst
/// the worker handle is stale, and the next run discards and respawns
/// it.
fn lock_runner(runner: &StdMutex<ScriptRunner>) -> MutexGuard<'_, ScriptRunner> {
    runner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/state", get(state_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Index page handler: a minimal page describing the endpoints.
async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Codelab Playground</title>
    <style>
        body { font-family: system-ui, sans-serif; margin: 2rem; }
        h1 { color: #2563eb; }
        pre { background: #f3f4f6; padding: 1rem; border-radius: 0.5rem; }
    </style>
</head>
<body>
    <h1>Codelab Playground Server</h1>
    <p>WebSocket endpoint: <code>/ws</code></p>
    <p>API endpoints:</p>
    <ul>
        <li><code>GET /health</code> - Health check</li>
        <li><code>GET /api/state</code> - Current session state</li>
    </ul>
    <script>
        const ws = new WebSocket(`ws://${location.host}/ws`);
        ws.onmessage = (e) => console.log('Server:', JSON.parse(e.data));
        ws.onopen = () => ws.send(JSON.stringify({ type: 'get_state' }));
    </script>
</body>
</html>"#,
    )
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Get current session state.
async fn state_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.read().await;
    let running = state.running.load(Ordering::SeqCst);
    Json(session.state_message(running))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    // Subscribe to server messages
    let mut rx = {
        let session = state.session.read().await;
        session.subscribe()
    };

    let sender = Arc::new(tokio::sync::Mutex::new(sender));

    // Send initial state
    {
        let session = state.session.read().await;
        let running = state.running.load(Ordering::SeqCst);
        send_message(&sender, &session.state_message(running)).await;
    }

    // Spawn task to forward broadcast messages to this client
    let sender_clone = sender.clone();
    let forward_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                let mut sender = sender_clone.lock().await;
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming client messages
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(msg, &state, &sender).await,
                Err(e) => {
                    tracing::warn!("Failed to parse client message: {} (input: {})", e, text);
                    send_message(
                        &sender,
                        &ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    forward_task.abort();
}

/// Send a server message through the WebSocket.
async fn send_message(
    sender: &Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
    msg: &ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut sender = sender.lock().await;
        let _ = sender.send(Message::Text(json.into())).await;
    }
}

/// Handle a client message.
async fn handle_client_message(
    msg: ClientMessage,
    state: &Arc<AppState>,
    sender: &Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
) {
    match msg {
        ClientMessage::GetState => {
            let session = state.session.read().await;
            let running = state.running.load(Ordering::SeqCst);
            send_message(sender, &session.state_message(running)).await;
        }

        ClientMessage::SetSource { editor, source } => {
            let mut session = state.session.write().await;
            session.set_source(editor, source);
        }

        ClientMessage::SelectTab { tab } => {
            // Clears both output surfaces; a run in flight is untouched.
            let mut session = state.session.write().await;
            session.select_tab(tab);
        }

        ClientMessage::Run => {
            // Single in-flight gate: duplicate run requests are dropped,
            // not queued.
            if state
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tracing::debug!("Run request ignored: execution already in progress");
                return;
            }
            state.stop_requested.store(false, Ordering::SeqCst);

            // Grab the stop handle (spawning the worker if needed) before
            // execution, so Stop can reach the worker while the run is in
            // flight.
            // The guard drops at the end of this statement; it must not
            // be held across an await.
            let stop_handle = lock_runner(&state.runner).stop_handle();
            match stop_handle {
                Ok(handle) => {
                    *state.stop_handle.lock().await = Some(handle);
                }
                Err(e) => {
                    state.running.store(false, Ordering::SeqCst);
                    tracing::error!("Failed to start worker: {}", e);
                    let session = state.session.read().await;
                    session.broadcast(ServerMessage::Error {
                        message: format!("failed to start worker: {}", e),
                    });
                    return;
                }
            }

            {
                let session = state.session.read().await;
                session.broadcast(ServerMessage::RunStarted);
            }

            // Spawn execution in a separate task so the WebSocket can
            // still process messages (in particular, Stop).
            let state_clone = state.clone();
            tokio::spawn(async move {
                let source = {
                    let session = state_clone.session.read().await;
                    session.script_source()
                };

                // Synchronous IPC under spawn_blocking, holding only the
                // runner lock. The session stays free for edits, tab
                // switches, and state reads while the run is in flight.
                let runner = state_clone.runner.clone();
                let exec_result =
                    tokio::task::spawn_blocking(move || lock_runner(&runner).run(&source)).await;

                // Session resolves regardless of outcome.
                *state_clone.stop_handle.lock().await = None;
                state_clone.running.store(false, Ordering::SeqCst);
                state_clone.stop_requested.store(false, Ordering::SeqCst);

                let session = state_clone.session.read().await;
                match exec_result {
                    Ok(outcome) => session.report_run_outcome(outcome),
                    Err(e) => {
                        tracing::error!("Task join error: {}", e);
                        session.broadcast(ServerMessage::Error {
                            message: "execution task failed".to_string(),
                        });
                    }
                }
            });
        }

        ClientMessage::Stop => {
            // Uses the stop handle directly - neither the session lock
            // nor the runner lock is needed, so this works while a run
            // is blocked on the worker.
            let handle = state.stop_handle.lock().await.clone();
            match handle {
                Some(handle) => {
                    state.stop_requested.store(true, Ordering::SeqCst);
                    handle.stop();
                }
                None => {
                    send_message(
                        sender,
                        &ServerMessage::Error {
                            message: "No execution in progress to stop".to_string(),
                        },
                    )
                    .await;
                }
            }
        }

        ClientMessage::Preview => {
            let session = state.session.read().await;
            session.preview();
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_health_json() {
        let health = serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        });
        assert_eq!(health["status"], "ok");
    }
}
