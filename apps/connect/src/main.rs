use std::{
    io::IsTerminal,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{PageLocation, TerminalBridge};
use futures::{SinkExt, StreamExt};
use shared::utf8::Utf8Decoder;
use tokio::{
    io::AsyncReadExt,
    signal::unix::{signal, SignalKind},
    sync::mpsc,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

mod native;

use native::{ChannelSink, JsonLinesParent, NativeTerminal, RawMode};

#[derive(Parser, Debug)]
#[command(name = "connect", about = "Attach the local terminal to a ws-shell server", version)]
struct Args {
    /// Server address, e.g. `http://127.0.0.1:8080`.
    #[arg(long)]
    server: Url,
    /// Account to run the shell as (multi-user servers only).
    #[arg(long)]
    user: Option<String>,
    /// Command typed into the shell once connected.
    #[arg(long)]
    exec: Option<String>,
    /// Append each terminal-output event to this file as JSON lines.
    #[arg(long)]
    output_log: Option<PathBuf>,
    /// Write client logs here; logging is off otherwise.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let location = page_location(&args.server, args.user.as_deref())?;
    let socket_url = location.default_socket_url()?;
    if socket_url.scheme() == "wss" {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    let parent = match &args.output_log {
        Some(path) => JsonLinesParent::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?,
        None => JsonLinesParent::disabled(),
    };

    info!(url = %socket_url, "connecting");
    let (socket, _) = connect_async(socket_url.as_str())
        .await
        .with_context(|| format!("failed to connect to {socket_url}"))?;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = frame_rx.recv().await {
            if let Err(err) = ws_tx.send(Message::Text(text)).await {
                warn!(error = %err, "failed to send frame");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let raw_mode = if std::io::stdin().is_terminal() {
        Some(RawMode::enable().context("failed to enable raw mode")?)
    } else {
        None
    };

    let mut bridge = TerminalBridge::new(
        &location,
        NativeTerminal::stdout(),
        ChannelSink::new(frame_tx),
        parent,
    );
    bridge.on_socket_open();
    if let Some(command) = args.exec.as_deref() {
        bridge.send_command(&exec_line(command));
    }

    let mut winch = signal(SignalKind::window_change()).context("failed to watch SIGWINCH")?;
    let mut stdin = tokio::io::stdin();
    let mut stdin_open = true;
    let mut buf = [0u8; 4096];
    let mut keyboard = Utf8Decoder::default();
    let mut binary_output = Utf8Decoder::default();

    loop {
        tokio::select! {
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Ok(n) => {
                    if let Some(text) = decode_chunk(&mut keyboard, &buf[..n]) {
                        bridge.on_terminal_data(&text);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    stdin_open = false;
                }
            },
            _ = winch.recv() => {
                bridge.on_window_resize();
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    bridge.on_socket_message(&text);
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if let Some(text) = decode_chunk(&mut binary_output, &bytes) {
                        bridge.on_socket_message(&text);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    bridge.on_socket_close();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "socket error");
                    bridge.on_socket_close();
                    break;
                }
            },
        }
    }

    drop(bridge);
    drop(raw_mode);
    let _ = writer.await;
    info!("disconnected");
    Ok(())
}

fn init_logging(path: Option<&std::path::Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// The page address the bridge would have been served from.
fn page_location(server: &Url, user: Option<&str>) -> Result<PageLocation> {
    let mut page = server.join("/web/").context("invalid server url")?;
    page.set_query(None);
    if let Some(user) = user {
        page.query_pairs_mut().append_pair("user", user);
    }
    Ok(PageLocation::from_url(&page)?)
}

/// Text completed by `bytes`, holding back a trailing partial character.
fn decode_chunk(decoder: &mut Utf8Decoder, bytes: &[u8]) -> Option<String> {
    Some(decoder.push(bytes)).filter(|text| !text.is_empty())
}

/// `--exec` commands run as typed, so they get a carriage return.
fn exec_line(command: &str) -> String {
    if command.ends_with(['\r', '\n']) {
        command.to_string()
    } else {
        format!("{command}\r")
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
