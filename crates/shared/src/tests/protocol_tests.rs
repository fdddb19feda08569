use super::*;

#[test]
fn client_frames_use_browser_wire_shape() {
    assert_eq!(
        ClientFrame::input("ls\r").to_text(),
        r#"{"type":"input","data":"ls\r"}"#
    );
    assert_eq!(
        ClientFrame::resize(TermSize::new(120, 40)).to_text(),
        r#"{"type":"resize","cols":120,"rows":40}"#
    );
}

#[test]
fn parses_known_client_frames() {
    assert_eq!(
        ClientFrame::parse(r#"{"type":"input","data":"echo hi\n"}"#).expect("input"),
        ClientFrame::input("echo hi\n")
    );
    assert_eq!(
        ClientFrame::parse(r#"{"type":"resize","cols":100,"rows":30}"#).expect("resize"),
        ClientFrame::Resize {
            cols: 100,
            rows: 30
        }
    );
}

#[test]
fn unknown_frame_types_and_missing_fields_are_tolerated() {
    assert_eq!(
        ClientFrame::parse(r#"{"type":"ping"}"#).expect("unknown"),
        ClientFrame::Unknown
    );
    assert_eq!(
        ClientFrame::parse(r#"{"type":"resize"}"#).expect("resize"),
        ClientFrame::Resize { cols: 0, rows: 0 }
    );
}

#[test]
fn rejects_non_json_frames() {
    assert!(matches!(
        ClientFrame::parse("not json"),
        Err(ProtocolError::InvalidJson(_))
    ));
}

#[test]
fn bridge_message_accepts_string_and_object_payloads() {
    let from_text = BridgeMessage::from_value(serde_json::Value::String(
        r#"{"type":"command","command":"uptime\n"}"#.to_string(),
    ))
    .expect("string payload");
    let from_object =
        BridgeMessage::from_value(serde_json::json!({ "type": "command", "command": "uptime\n" }))
            .expect("object payload");

    assert_eq!(from_text, from_object);
    assert_eq!(from_text.command(), Some("uptime\n"));
}

#[test]
fn bridge_message_rejects_scalars() {
    assert!(matches!(
        BridgeMessage::from_value(serde_json::json!(42)),
        Err(ProtocolError::NotAnObject)
    ));
}

#[test]
fn untyped_bridge_messages_are_unknown() {
    for payload in [
        serde_json::json!({ "source": "devtools", "data": 1 }),
        serde_json::json!({ "type": 7, "command": "ls" }),
        serde_json::Value::String(r#"{"command":"ls"}"#.to_string()),
    ] {
        assert_eq!(
            BridgeMessage::from_value(payload).expect("untyped payload"),
            BridgeMessage::Unknown
        );
    }
}

#[test]
fn typed_bridge_messages_with_bad_fields_are_errors() {
    assert!(matches!(
        BridgeMessage::parse(r#"{"type":"resize","cols":80.5,"rows":24}"#),
        Err(ProtocolError::InvalidJson(_))
    ));
}

#[test]
fn empty_command_and_zero_resize_are_not_actionable() {
    let empty = BridgeMessage::parse(r#"{"type":"command","command":""}"#).expect("parse");
    assert_eq!(empty.command(), None);

    let missing = BridgeMessage::parse(r#"{"type":"command"}"#).expect("parse");
    assert_eq!(missing.command(), None);

    let zero = BridgeMessage::parse(r#"{"type":"resize","cols":0,"rows":24}"#).expect("parse");
    assert_eq!(zero.size(), None);

    let partial = BridgeMessage::parse(r#"{"type":"resize","cols":80}"#).expect("parse");
    assert_eq!(partial.size(), None);

    let full = BridgeMessage::parse(r#"{"type":"resize","cols":80,"rows":24}"#).expect("parse");
    assert_eq!(full.size(), Some(TermSize::new(80, 24)));
}

#[test]
fn terminal_output_event_uses_hyphenated_type() {
    let event = BridgeEvent::terminal_output("hello");
    assert_eq!(
        serde_json::to_value(&event).expect("json"),
        serde_json::json!({ "type": "terminal-output", "data": "hello" })
    );
}

#[test]
fn ws_path_encodes_user_name() {
    assert_eq!(ws_path("alice"), "/ws?user=alice");
    assert_eq!(ws_path("a b&c"), "/ws?user=a+b%26c");
}
