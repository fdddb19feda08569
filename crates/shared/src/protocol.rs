use serde::{Deserialize, Serialize};

use crate::{domain::TermSize, error::ProtocolError};

pub const WS_ROUTE: &str = "/ws";
pub const WEB_ROUTE: &str = "/web";

/// User requested by the browser page when its URL carries no `?user=`.
pub const DEFAULT_BRIDGE_USER: &str = "staff";

/// Written into the terminal once the socket is gone.
pub const CONNECTION_CLOSED_BANNER: &str = "\r\n\x1b[31mConnection closed\x1b[0m\r\n";

/// Target origin used when mirroring output to the parent window.
pub const PARENT_TARGET_ORIGIN: &str = "*";

/// Frames a terminal client sends over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Input {
        #[serde(default)]
        data: String,
    },
    Resize {
        #[serde(default)]
        cols: u16,
        #[serde(default)]
        rows: u16,
    },
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    pub fn input(data: impl Into<String>) -> Self {
        Self::Input { data: data.into() }
    }

    pub fn resize(size: TermSize) -> Self {
        Self::Resize {
            cols: size.cols,
            rows: size.rows,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> String {
        // Plain enum of strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Messages another window posts into the terminal page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    Command {
        #[serde(default)]
        command: Option<String>,
    },
    Resize {
        #[serde(default)]
        cols: Option<u16>,
        #[serde(default)]
        rows: Option<u16>,
    },
    #[serde(other)]
    Unknown,
}

impl BridgeMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match serde_json::from_str::<serde_json::Value>(text)? {
            value @ serde_json::Value::Object(_) => Self::from_object(value),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// Accepts either a structured object or a string holding JSON, the two
    /// shapes a `message` event can carry.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        match value {
            serde_json::Value::String(text) => Self::parse(&text),
            value @ serde_json::Value::Object(_) => Self::from_object(value),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// Objects without a string `type` come from other senders and are `Unknown`.
    fn from_object(value: serde_json::Value) -> Result<Self, ProtocolError> {
        if !value.get("type").is_some_and(serde_json::Value::is_string) {
            return Ok(Self::Unknown);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The command to run, if present and non-empty.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Command { command } => command.as_deref().filter(|c| !c.is_empty()),
            _ => None,
        }
    }

    /// The requested size, if both dimensions are present and non-zero.
    pub fn size(&self) -> Option<TermSize> {
        match self {
            Self::Resize {
                cols: Some(cols),
                rows: Some(rows),
            } => Some(TermSize::new(*cols, *rows)).filter(TermSize::is_valid),
            _ => None,
        }
    }
}

/// Messages the terminal page posts to its parent window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "terminal-output")]
    TerminalOutput { data: String },
}

impl BridgeEvent {
    pub fn terminal_output(data: impl Into<String>) -> Self {
        Self::TerminalOutput { data: data.into() }
    }
}

/// Query string of the socket route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub user: Option<String>,
}

pub fn ws_path(user: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(user.as_bytes()).collect();
    format!("{WS_ROUTE}?user={encoded}")
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
