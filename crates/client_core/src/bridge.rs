use shared::{
    domain::TermSize,
    protocol::{
        BridgeEvent, BridgeMessage, ClientFrame, CONNECTION_CLOSED_BANNER, PARENT_TARGET_ORIGIN,
    },
};
use tracing::{debug, error, warn};

use crate::{error::BridgeError, location::PageLocation};

/// The terminal emulator widget.
pub trait TerminalSurface {
    /// Render terminal output verbatim.
    fn write(&mut self, data: &str);
    fn size(&self) -> TermSize;
    fn resize(&mut self, size: TermSize);
    /// Recompute the geometry from the hosting viewport.
    fn fit(&mut self);
}

/// The shell socket.
pub trait FrameSink {
    fn is_open(&self) -> bool;
    fn send(&mut self, text: String) -> Result<(), BridgeError>;
}

/// The window embedding the terminal page.
pub trait ParentWindow {
    fn post_message(&mut self, event: &BridgeEvent, target_origin: &str);
}

/// Which senders may drive the terminal through window messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept any origin whose string contains the page host.
    #[default]
    HostSubstring,
    /// Accept only these exact origins.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    fn accepts(&self, origin: &str, host: &str) -> bool {
        match self {
            Self::HostSubstring => origin.contains(host),
            Self::AllowList(origins) => origins.iter().any(|allowed| allowed == origin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    SocketNotOpen,
    OriginRejected,
    Malformed,
    NotActionable,
    SendFailed,
}

/// What a bridge handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Sent(ClientFrame),
    Rendered,
    ResizedTerminal(TermSize),
    Closed,
    Dropped(DropReason),
}

pub struct TerminalBridge<T, S, P> {
    terminal: T,
    socket: S,
    parent: P,
    host: String,
    origin_policy: OriginPolicy,
    target_origin: String,
}

impl<T, S, P> TerminalBridge<T, S, P>
where
    T: TerminalSurface,
    S: FrameSink,
    P: ParentWindow,
{
    pub fn new(location: &PageLocation, terminal: T, socket: S, parent: P) -> Self {
        Self {
            terminal,
            socket,
            parent,
            host: location.host.clone(),
            origin_policy: OriginPolicy::default(),
            target_origin: PARENT_TARGET_ORIGIN.to_string(),
        }
    }

    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    pub fn with_target_origin(mut self, target_origin: impl Into<String>) -> Self {
        self.target_origin = target_origin.into();
        self
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn on_socket_open(&mut self) -> BridgeOutcome {
        let size = self.terminal.size();
        self.send_frame(ClientFrame::resize(size))
    }

    pub fn on_terminal_data(&mut self, data: &str) -> BridgeOutcome {
        if !self.socket.is_open() {
            return BridgeOutcome::Dropped(DropReason::SocketNotOpen);
        }
        self.send_frame(ClientFrame::input(data))
    }

    pub fn on_window_resize(&mut self) -> BridgeOutcome {
        self.terminal.fit();
        if !self.socket.is_open() {
            return BridgeOutcome::Dropped(DropReason::SocketNotOpen);
        }
        let size = self.terminal.size();
        self.send_frame(ClientFrame::resize(size))
    }

    pub fn on_socket_message(&mut self, data: &str) -> BridgeOutcome {
        self.terminal.write(data);
        self.parent
            .post_message(&BridgeEvent::terminal_output(data), &self.target_origin);
        BridgeOutcome::Rendered
    }

    pub fn on_socket_close(&mut self) -> BridgeOutcome {
        self.terminal.write(CONNECTION_CLOSED_BANNER);
        BridgeOutcome::Closed
    }

    pub fn on_window_message(
        &mut self,
        origin: &str,
        payload: serde_json::Value,
    ) -> BridgeOutcome {
        debug!(%origin, "terminal received window message");

        if !self.origin_policy.accepts(origin, &self.host) {
            debug!(%origin, host = %self.host, "window message origin rejected");
            return BridgeOutcome::Dropped(DropReason::OriginRejected);
        }

        let message = match BridgeMessage::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "failed to parse window message");
                return BridgeOutcome::Dropped(DropReason::Malformed);
            }
        };

        if let Some(command) = message.command() {
            return self.send_command(command);
        }
        if let Some(size) = message.size() {
            self.terminal.resize(size);
            return BridgeOutcome::ResizedTerminal(size);
        }
        BridgeOutcome::Dropped(DropReason::NotActionable)
    }

    /// Types `command` into the shell as if it arrived in a window message.
    pub fn send_command(&mut self, command: &str) -> BridgeOutcome {
        if !self.socket.is_open() {
            warn!("socket not ready, dropping command");
            return BridgeOutcome::Dropped(DropReason::SocketNotOpen);
        }
        self.send_frame(ClientFrame::input(command))
    }

    fn send_frame(&mut self, frame: ClientFrame) -> BridgeOutcome {
        match self.socket.send(frame.to_text()) {
            Ok(()) => BridgeOutcome::Sent(frame),
            Err(err) => {
                warn!(error = %err, "failed to send frame");
                BridgeOutcome::Dropped(DropReason::SendFailed)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
