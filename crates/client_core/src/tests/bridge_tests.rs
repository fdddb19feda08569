use super::*;

#[derive(Default)]
struct FakeTerminal {
    written: Vec<String>,
    size: TermSize,
    viewport: Option<TermSize>,
}

impl TerminalSurface for FakeTerminal {
    fn write(&mut self, data: &str) {
        self.written.push(data.to_string());
    }

    fn size(&self) -> TermSize {
        self.size
    }

    fn resize(&mut self, size: TermSize) {
        self.size = size;
    }

    fn fit(&mut self) {
        if let Some(viewport) = self.viewport {
            self.size = viewport;
        }
    }
}

struct FakeSocket {
    open: bool,
    fail: bool,
    sent: Vec<String>,
}

impl FakeSocket {
    fn open() -> Self {
        Self {
            open: true,
            fail: false,
            sent: Vec::new(),
        }
    }

    fn connecting() -> Self {
        Self {
            open: false,
            ..Self::open()
        }
    }
}

impl FrameSink for FakeSocket {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, text: String) -> Result<(), BridgeError> {
        if self.fail {
            return Err(BridgeError::SocketClosed);
        }
        self.sent.push(text);
        Ok(())
    }
}

#[derive(Default)]
struct FakeParent {
    posted: Vec<(BridgeEvent, String)>,
}

impl ParentWindow for FakeParent {
    fn post_message(&mut self, event: &BridgeEvent, target_origin: &str) {
        self.posted.push((event.clone(), target_origin.to_string()));
    }
}

fn bridge(socket: FakeSocket) -> TerminalBridge<FakeTerminal, FakeSocket, FakeParent> {
    let location = PageLocation::parse("http://term.local:8080/web/").expect("url");
    let terminal = FakeTerminal {
        size: TermSize::new(80, 24),
        ..FakeTerminal::default()
    };
    TerminalBridge::new(&location, terminal, socket, FakeParent::default())
}

#[test]
fn socket_open_sends_current_size() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_socket_open();

    assert_eq!(
        outcome,
        BridgeOutcome::Sent(ClientFrame::resize(TermSize::new(80, 24)))
    );
    assert_eq!(
        bridge.socket().sent,
        vec![r#"{"type":"resize","cols":80,"rows":24}"#.to_string()]
    );
}

#[test]
fn keystrokes_become_input_frames_only_while_open() {
    let mut open = bridge(FakeSocket::open());
    assert_eq!(
        open.on_terminal_data("l"),
        BridgeOutcome::Sent(ClientFrame::input("l"))
    );
    assert_eq!(
        open.socket().sent,
        vec![r#"{"type":"input","data":"l"}"#.to_string()]
    );

    let mut connecting = bridge(FakeSocket::connecting());
    assert_eq!(
        connecting.on_terminal_data("l"),
        BridgeOutcome::Dropped(DropReason::SocketNotOpen)
    );
    assert!(connecting.socket().sent.is_empty());
}

#[test]
fn window_resize_refits_then_reports_new_size() {
    let mut bridge = bridge(FakeSocket::open());
    bridge.terminal.viewport = Some(TermSize::new(132, 43));

    let outcome = bridge.on_window_resize();

    assert_eq!(bridge.terminal().size, TermSize::new(132, 43));
    assert_eq!(
        outcome,
        BridgeOutcome::Sent(ClientFrame::resize(TermSize::new(132, 43)))
    );
}

#[test]
fn window_resize_while_connecting_only_refits() {
    let mut bridge = bridge(FakeSocket::connecting());
    bridge.terminal.viewport = Some(TermSize::new(100, 30));

    assert_eq!(
        bridge.on_window_resize(),
        BridgeOutcome::Dropped(DropReason::SocketNotOpen)
    );
    assert_eq!(bridge.terminal().size, TermSize::new(100, 30));
    assert!(bridge.socket().sent.is_empty());
}

#[test]
fn socket_output_is_rendered_and_mirrored_to_parent() {
    let mut bridge = bridge(FakeSocket::open());
    let output = "\x1b[01;32mroot@box\x1b[00m:~$ ";

    assert_eq!(bridge.on_socket_message(output), BridgeOutcome::Rendered);
    assert_eq!(bridge.terminal().written, vec![output.to_string()]);
    assert_eq!(
        bridge.parent().posted,
        vec![(BridgeEvent::terminal_output(output), "*".to_string())]
    );
}

#[test]
fn socket_close_prints_banner() {
    let mut bridge = bridge(FakeSocket::open());
    assert_eq!(bridge.on_socket_close(), BridgeOutcome::Closed);
    assert_eq!(
        bridge.terminal().written,
        vec![CONNECTION_CLOSED_BANNER.to_string()]
    );
}

#[test]
fn window_command_from_same_host_is_forwarded() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "http://term.local:8080",
        serde_json::json!({ "type": "command", "command": "ls -la\n" }),
    );

    assert_eq!(outcome, BridgeOutcome::Sent(ClientFrame::input("ls -la\n")));
    assert_eq!(
        bridge.socket().sent,
        vec![r#"{"type":"input","data":"ls -la\n"}"#.to_string()]
    );
}

#[test]
fn window_command_as_json_string_is_forwarded() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "https://term.local:8080",
        serde_json::Value::String(r#"{"type":"command","command":"pwd\n"}"#.to_string()),
    );
    assert_eq!(outcome, BridgeOutcome::Sent(ClientFrame::input("pwd\n")));
}

#[test]
fn host_check_is_a_substring_match() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "https://term.local:8080.attacker.example",
        serde_json::json!({ "type": "command", "command": "id\n" }),
    );
    assert_eq!(outcome, BridgeOutcome::Sent(ClientFrame::input("id\n")));
}

#[test]
fn window_messages_from_other_origins_are_ignored() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "https://elsewhere.example",
        serde_json::json!({ "type": "command", "command": "rm -rf /\n" }),
    );

    assert_eq!(outcome, BridgeOutcome::Dropped(DropReason::OriginRejected));
    assert!(bridge.socket().sent.is_empty());
}

#[test]
fn allow_list_policy_requires_exact_origin() {
    let mut bridge = bridge(FakeSocket::open()).with_origin_policy(OriginPolicy::AllowList(
        vec!["https://portal.example".to_string()],
    ));

    let rejected = bridge.on_window_message(
        "http://term.local:8080",
        serde_json::json!({ "type": "command", "command": "id\n" }),
    );
    assert_eq!(rejected, BridgeOutcome::Dropped(DropReason::OriginRejected));

    let accepted = bridge.on_window_message(
        "https://portal.example",
        serde_json::json!({ "type": "command", "command": "id\n" }),
    );
    assert_eq!(accepted, BridgeOutcome::Sent(ClientFrame::input("id\n")));
}

#[test]
fn window_resize_message_resizes_widget_not_socket() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "http://term.local:8080",
        serde_json::json!({ "type": "resize", "cols": 100, "rows": 50 }),
    );

    assert_eq!(
        outcome,
        BridgeOutcome::ResizedTerminal(TermSize::new(100, 50))
    );
    assert_eq!(bridge.terminal().size, TermSize::new(100, 50));
    assert!(bridge.socket().sent.is_empty());
}

#[test]
fn malformed_window_message_is_swallowed() {
    let mut bridge = bridge(FakeSocket::open());
    let outcome = bridge.on_window_message(
        "http://term.local:8080",
        serde_json::Value::String("{not json".to_string()),
    );
    assert_eq!(outcome, BridgeOutcome::Dropped(DropReason::Malformed));
}

#[test]
fn incomplete_window_messages_do_nothing() {
    let mut bridge = bridge(FakeSocket::open());
    for payload in [
        serde_json::json!({ "type": "command" }),
        serde_json::json!({ "type": "resize", "cols": 0, "rows": 10 }),
        serde_json::json!({ "type": "focus" }),
        serde_json::json!({ "source": "react-devtools" }),
    ] {
        assert_eq!(
            bridge.on_window_message("http://term.local:8080", payload),
            BridgeOutcome::Dropped(DropReason::NotActionable)
        );
    }
    assert_eq!(bridge.terminal().size, TermSize::new(80, 24));
    assert!(bridge.socket().sent.is_empty());
}

#[test]
fn window_command_while_connecting_is_dropped() {
    let mut bridge = bridge(FakeSocket::connecting());
    assert_eq!(
        bridge.on_window_message(
            "http://term.local:8080",
            serde_json::json!({ "type": "command", "command": "ls\n" }),
        ),
        BridgeOutcome::Dropped(DropReason::SocketNotOpen)
    );
}

#[test]
fn send_failures_are_reported() {
    let mut socket = FakeSocket::open();
    socket.fail = true;
    let mut bridge = bridge(socket);
    assert_eq!(
        bridge.on_terminal_data("x"),
        BridgeOutcome::Dropped(DropReason::SendFailed)
    );
}

#[test]
fn custom_target_origin_is_used_for_mirroring() {
    let mut bridge = bridge(FakeSocket::open()).with_target_origin("https://portal.example");
    bridge.on_socket_message("ok");
    assert_eq!(bridge.parent().posted[0].1, "https://portal.example");
}
