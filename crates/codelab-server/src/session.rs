//! Sandbox session management.
//!
//! Owns the editor buffers, the active tab, and the broadcast channel
//! of server messages. One session exists per server; it lives for the
//! server's lifetime. The worker runner lives outside the session (in
//! `AppState`) so edits and tab switches stay responsive while a run
//! blocks on the worker.

use std::sync::Arc;

use codelab_core::{ExecErrorKind, ExecOutcome};
use tokio::sync::{broadcast, RwLock};

use crate::preview::compose_document;
use crate::protocol::{EditorId, EditorSources, ServerMessage};

/// Capacity for the broadcast channel. If clients fall behind, older
/// messages are dropped.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// A sandbox playground session.
pub struct SandboxSession {
    /// Current text of the four editors.
    sources: EditorSources,

    /// Currently active tab; selects the output surface for results.
    active_tab: EditorId,

    /// Broadcast channel for server messages.
    tx: broadcast::Sender<ServerMessage>,
}

/// Thread-safe session handle.
pub type SessionHandle = Arc<RwLock<SandboxSession>>;

impl SandboxSession {
    /// Create a new session with empty editors and the script tab
    /// active.
    pub fn new() -> (Self, broadcast::Receiver<ServerMessage>) {
        let (tx, rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        (
            Self {
                sources: EditorSources::default(),
                active_tab: EditorId::Script,
                tx,
            },
            rx,
        )
    }

    /// Subscribe to server messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Broadcast a server message, ignoring send failures.
    pub fn broadcast(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }

    /// Current state snapshot for a client.
    pub fn state_message(&self, running: bool) -> ServerMessage {
        ServerMessage::SessionState {
            sources: self.sources.clone(),
            active_tab: self.active_tab,
            running,
        }
    }

    /// Replace one editor's text.
    pub fn set_source(&mut self, editor: EditorId, source: String) {
        self.sources.set(editor, source);
    }

    /// The script editor's current text.
    pub fn script_source(&self) -> String {
        self.sources.get(EditorId::Script).to_string()
    }

    /// The currently active tab.
    pub fn active_tab(&self) -> EditorId {
        self.active_tab
    }

    /// Switch the active tab.
    ///
    /// Clears both output surfaces unconditionally; a run in flight is
    /// unaffected and its result will land on the surface matching the
    /// tab active when it arrives.
    pub fn select_tab(&mut self, tab: EditorId) {
        self.active_tab = tab;
        self.broadcast(ServerMessage::OutputCleared);
    }

    /// Broadcast a finished run's outcome.
    ///
    /// The surface is chosen here, from the tab active when the result
    /// arrives, not when the run was dispatched. The run itself happens
    /// outside the session lock, so the tab may well have changed in
    /// between.
    pub fn report_run_outcome(&self, outcome: codelab_core::Result<ExecOutcome>) {
        let surface = self.active_tab.surface();

        let msg = match outcome {
            Ok(Ok(output)) => ServerMessage::RunCompleted { surface, output },
            Ok(Err(err)) => ServerMessage::RunFailed {
                surface,
                kind: err.kind,
                message: err.message,
            },
            Err(err) => {
                // Transport fault: the runner has already discarded the
                // worker; the next run starts from a fresh one.
                tracing::error!("Worker transport fault: {}", err);
                ServerMessage::RunFailed {
                    surface,
                    kind: ExecErrorKind::Runtime,
                    message: format!("worker failure: {}", err),
                }
            }
        };

        self.broadcast(msg);
    }

    /// Compose the preview document and broadcast it.
    ///
    /// Decoupled from the run/stop state entirely.
    pub fn preview(&self) {
        let document = compose_document(&self.sources.html, &self.sources.css, &self.sources.js);
        self.broadcast(ServerMessage::PreviewReady { document });
    }
}

impl Default for SandboxSession {
    fn default() -> Self {
        Self::new().0
    }
}
