use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use client_core::{BridgeError, FrameSink, ParentWindow, TerminalSurface};
use crossterm::{execute, terminal};
use shared::{domain::TermSize, protocol::BridgeEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

/// The local TTY standing in for the browser terminal widget.
pub struct NativeTerminal<W> {
    out: W,
    size: TermSize,
}

impl NativeTerminal<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), current_size())
    }
}

impl<W: Write> NativeTerminal<W> {
    pub fn new(out: W, size: TermSize) -> Self {
        Self { out, size }
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> TerminalSurface for NativeTerminal<W> {
    fn write(&mut self, data: &str) {
        let result = self
            .out
            .write_all(data.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            warn!(error = %err, "failed to write to terminal");
        }
    }

    fn size(&self) -> TermSize {
        self.size
    }

    fn resize(&mut self, size: TermSize) {
        if let Err(err) = execute!(self.out, terminal::SetSize(size.cols, size.rows)) {
            warn!(error = %err, "failed to resize terminal");
        }
        self.size = size;
    }

    fn fit(&mut self) {
        self.size = current_size();
    }
}

fn current_size() -> TermSize {
    terminal::size()
        .map(|(cols, rows)| TermSize::new(cols, rows))
        .ok()
        .filter(TermSize::is_valid)
        .unwrap_or_default()
}

/// Hands frames to the socket writer task.
pub struct ChannelSink {
    tx: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&mut self, text: String) -> Result<(), BridgeError> {
        self.tx.send(text).map_err(|_| BridgeError::SocketClosed)
    }
}

/// Appends every event posted to the parent window as one JSON line.
pub struct JsonLinesParent {
    file: Option<File>,
}

impl JsonLinesParent {
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(file) })
    }
}

impl ParentWindow for JsonLinesParent {
    fn post_message(&mut self, event: &BridgeEvent, target_origin: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        trace!(%target_origin, "posting event to output log");
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode event");
                return;
            }
        };
        if let Err(err) = writeln!(file, "{line}") {
            warn!(error = %err, "failed to append to output log");
        }
    }
}

/// Raw mode for the lifetime of the guard.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
#[path = "tests/native_tests.rs"]
mod tests;
