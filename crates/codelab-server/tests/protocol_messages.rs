//! Integration tests for protocol message serialization.
//!
//! Tests all client and server message types for correct JSON serialization.

use codelab_server::protocol::*;

#[test]
fn test_all_client_messages_serialize() {
    // Test all ClientMessage variants
    let messages = vec![
        ClientMessage::GetState,
        ClientMessage::SetSource {
            editor: EditorId::Script,
            source: "print('hi')".to_string(),
        },
        ClientMessage::SelectTab {
            tab: EditorId::Html,
        },
        ClientMessage::Run,
        ClientMessage::Stop,
        ClientMessage::Preview,
    ];

    // Serialize and deserialize each message
    for msg in messages {
        let json = serde_json::to_string(&msg).expect("Failed to serialize");
        let parsed: ClientMessage = serde_json::from_str(&json).expect("Failed to deserialize");

        // Check that the type field matches
        let msg_type = match &msg {
            ClientMessage::GetState => "get_state",
            ClientMessage::SetSource { .. } => "set_source",
            ClientMessage::SelectTab { .. } => "select_tab",
            ClientMessage::Run => "run",
            ClientMessage::Stop => "stop",
            ClientMessage::Preview => "preview",
        };

        assert!(
            json.contains(msg_type),
            "Message type '{}' not found in JSON: {}",
            msg_type,
            json
        );

        // Verify roundtrip
        assert_eq!(
            std::mem::discriminant(&msg),
            std::mem::discriminant(&parsed),
            "Message variant mismatch for {}",
            msg_type
        );
    }
}

#[test]
fn test_all_server_messages_serialize() {
    // Test all ServerMessage variants
    let messages = vec![
        ServerMessage::SessionState {
            sources: EditorSources::default(),
            active_tab: EditorId::Script,
            running: false,
        },
        ServerMessage::RunStarted,
        ServerMessage::RunCompleted {
            surface: OutputSurface::Text,
            output: "42\n".to_string(),
        },
        ServerMessage::RunFailed {
            surface: OutputSurface::Text,
            kind: ExecErrorKind::TimeLimit,
            message: "execution exceeded the time limit".to_string(),
        },
        ServerMessage::OutputCleared,
        ServerMessage::PreviewReady {
            document: "<p>hi</p><style></style><script></script>".to_string(),
        },
        ServerMessage::Error {
            message: "Test error".to_string(),
        },
    ];

    // Serialize and deserialize each message
    for msg in messages {
        let json = serde_json::to_string(&msg).expect("Failed to serialize");
        let parsed: ServerMessage = serde_json::from_str(&json).expect("Failed to deserialize");

        // Verify roundtrip (check discriminant matches)
        assert_eq!(
            std::mem::discriminant(&msg),
            std::mem::discriminant(&parsed),
            "Message variant mismatch"
        );
    }
}

#[test]
fn test_editor_id_tags() {
    for (editor, tag) in [
        (EditorId::Script, "\"script\""),
        (EditorId::Html, "\"html\""),
        (EditorId::Css, "\"css\""),
        (EditorId::Js, "\"js\""),
    ] {
        let json = serde_json::to_string(&editor).unwrap();
        assert_eq!(json, tag);
        let parsed: EditorId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, editor);
    }
}

#[test]
fn test_error_kind_tags() {
    for (kind, tag) in [
        (ExecErrorKind::LineLimit, "\"line_limit\""),
        (ExecErrorKind::TimeLimit, "\"time_limit\""),
        (ExecErrorKind::Stopped, "\"stopped\""),
        (ExecErrorKind::Runtime, "\"runtime\""),
    ] {
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, tag);
    }
}

#[test]
fn test_run_failed_carries_surface_and_kind() {
    let json = r#"{"type":"run_failed","surface":"document","kind":"stopped","message":"execution stopped by user"}"#;
    let parsed: ServerMessage = serde_json::from_str(json).unwrap();
    match parsed {
        ServerMessage::RunFailed {
            surface,
            kind,
            message,
        } => {
            assert_eq!(surface, OutputSurface::Document);
            assert_eq!(kind, ExecErrorKind::Stopped);
            assert_eq!(message, "execution stopped by user");
        }
        _ => panic!("Wrong message type"),
    }
}
