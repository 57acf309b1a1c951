//! WebSocket protocol messages for the codelab server.
//!
//! Defines the message types exchanged between the browser client and
//! the session controller.

use serde::{Deserialize, Serialize};

pub use codelab_core::ExecErrorKind;

/// One of the four editor surfaces (and, equivalently, its tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorId {
    /// The instrumented-language editor; its runs go through the worker.
    Script,
    /// Markup editor (preview tab group).
    Html,
    /// Style editor (preview tab group).
    Css,
    /// Behavior editor (preview tab group).
    Js,
}

impl EditorId {
    /// The output surface a result is routed to while this tab is active.
    pub fn surface(self) -> OutputSurface {
        match self {
            EditorId::Script => OutputSurface::Text,
            EditorId::Html | EditorId::Css | EditorId::Js => OutputSurface::Document,
        }
    }
}

/// Render target for a run's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSurface {
    /// Plain-text pane showing output/error strings verbatim.
    Text,
    /// Rendered-document pane (iframe).
    Document,
}

/// Current text of all four editors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSources {
    /// Script editor contents.
    pub script: String,
    /// Markup editor contents.
    pub html: String,
    /// Style editor contents.
    pub css: String,
    /// Behavior editor contents.
    pub js: String,
}

impl EditorSources {
    /// Current text of one editor.
    pub fn get(&self, editor: EditorId) -> &str {
        match editor {
            EditorId::Script => &self.script,
            EditorId::Html => &self.html,
            EditorId::Css => &self.css,
            EditorId::Js => &self.js,
        }
    }

    /// Replace one editor's text.
    pub fn set(&mut self, editor: EditorId, source: String) {
        match editor {
            EditorId::Script => self.script = source,
            EditorId::Html => self.html = source,
            EditorId::Css => self.css = source,
            EditorId::Js => self.js = source,
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request current session state.
    GetState,

    /// Replace an editor's text.
    SetSource {
        /// Editor being edited.
        editor: EditorId,
        /// New source text.
        source: String,
    },

    /// Switch the active tab. Clears both output surfaces; does not
    /// affect a run in flight.
    SelectTab {
        /// Newly active tab.
        tab: EditorId,
    },

    /// Run the script editor's text in the worker.
    /// Ignored while a run is already in flight.
    Run,

    /// Request a cooperative stop of the in-flight run.
    Stop,

    /// Compose the markup/style/behavior editors into a document for
    /// the rendered pane. Independent of run/stop state.
    Preview,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full session state (sent on connection or on request).
    SessionState {
        /// All editor contents.
        sources: EditorSources,
        /// Currently active tab.
        active_tab: EditorId,
        /// Whether a run is in flight.
        running: bool,
    },

    /// A run was dispatched; the client disables the run control.
    RunStarted,

    /// The run finished; captured output for the given surface.
    RunCompleted {
        /// Surface matching the tab active at result time.
        surface: OutputSurface,
        /// Captured program output.
        output: String,
    },

    /// The run failed. The client shows `Error: <message>`.
    RunFailed {
        /// Surface matching the tab active at result time.
        surface: OutputSurface,
        /// Failure category.
        kind: ExecErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// Both output surfaces were cleared (tab switch).
    OutputCleared,

    /// A composed document for the rendered pane.
    PreviewReady {
        /// Full document text.
        document: String,
    },

    /// Generic error message.
    Error {
        /// Error description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::SetSource {
            editor: EditorId::Script,
            source: "print(1)".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("set_source"));
        assert!(json.contains("\"script\""));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::SetSource { editor, source } => {
                assert_eq!(editor, EditorId::Script);
                assert_eq!(source, "print(1)");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::RunFailed {
            surface: OutputSurface::Text,
            kind: ExecErrorKind::LineLimit,
            message: "execution exceeded 1000 lines".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("run_failed"));
        assert!(json.contains("line_limit"));
    }

    #[test]
    fn test_surface_routing() {
        assert_eq!(EditorId::Script.surface(), OutputSurface::Text);
        assert_eq!(EditorId::Html.surface(), OutputSurface::Document);
        assert_eq!(EditorId::Css.surface(), OutputSurface::Document);
        assert_eq!(EditorId::Js.surface(), OutputSurface::Document);
    }

    #[test]
    fn test_editor_sources_accessors() {
        let mut sources = EditorSources::default();
        sources.set(EditorId::Css, "body { margin: 0 }".to_string());
        assert_eq!(sources.get(EditorId::Css), "body { margin: 0 }");
        assert_eq!(sources.get(EditorId::Script), "");
    }
}
