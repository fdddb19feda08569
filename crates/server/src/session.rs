use std::{
    fs::Permissions,
    io::{self, Write},
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    sync::Arc,
};

use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use nix::unistd::{Uid, User};
use shared::{domain::TermSize, protocol::ClientFrame, utf8::Utf8Decoder};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::Settings,
    pty::{Credentials, PtyError, PtyEvent, PtyProcess, SpawnSpec},
    shell,
};

const CHANGE_USER_HINT: &str = "You can visit ?user=username to change user";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to lookup user: {0}")]
    UserLookup(String),
    #[error("Failed to create shell rc file: {0}")]
    RcFile(#[source] io::Error),
    #[error("Failed to start PTY: {0}")]
    Spawn(#[from] PtyError),
}

impl SessionError {
    fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UserLookup(_) => Some(CHANGE_USER_HINT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub conn_id: String,
    pub remote: SocketAddr,
    pub requested_user: Option<String>,
}

/// A shell ready to spawn. The rc file is deleted when this is dropped.
pub struct PreparedShell {
    pub user: String,
    pub spec: SpawnSpec,
    pub rc_file: NamedTempFile,
}

/// The input side of a running shell.
pub trait ShellControl {
    fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&mut self, size: TermSize) -> Result<(), PtyError>;
}

impl ShellControl for PtyProcess {
    fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.write(data)
    }

    fn resize(&mut self, size: TermSize) -> Result<(), PtyError> {
        PtyProcess::resize(self, size)
    }
}

pub fn resolve_user(settings: &Settings, requested: Option<&str>) -> String {
    if settings.single_user {
        return settings.default_user.clone();
    }
    requested
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .unwrap_or(&settings.default_user)
        .to_string()
}

pub fn lookup_user(name: &str) -> Result<User, SessionError> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(SessionError::UserLookup(format!("unknown user {name}"))),
        Err(err) => Err(SessionError::UserLookup(err.to_string())),
    }
}

pub fn prepare_shell(
    settings: &Settings,
    user: &User,
    remote: SocketAddr,
) -> Result<PreparedShell, SessionError> {
    let mut rc_file = tempfile::Builder::new()
        .prefix(&format!(".bashrc_{}_", remote.to_string().replace([':', '[', ']'], "_")))
        .permissions(Permissions::from_mode(0o644))
        .tempfile()
        .map_err(SessionError::RcFile)?;
    rc_file
        .write_all(shell::RC_CONTENT.as_bytes())
        .map_err(SessionError::RcFile)?;
    rc_file.flush().map_err(SessionError::RcFile)?;

    let home = user.dir.to_string_lossy().into_owned();
    let env = shell::session_env(
        &user.name,
        &home,
        std::env::var("PATH").ok(),
        &rc_file.path().to_string_lossy(),
    );

    let credentials = (!settings.single_user && user.uid != Uid::effective()).then_some(Credentials {
        uid: user.uid,
        gid: user.gid,
    });

    Ok(PreparedShell {
        user: user.name.clone(),
        spec: SpawnSpec {
            program: settings.fork_cmd.clone(),
            args: shell::LOGIN_ARGS.iter().map(|arg| arg.to_string()).collect(),
            env,
            cwd: Some(user.dir.clone()).filter(|dir| dir.is_dir()),
            credentials,
            size: TermSize::default(),
        },
        rc_file,
    })
}

/// Applies one client frame to the shell. Bad frames are logged and skipped.
pub fn apply_frame(shell: &mut impl ShellControl, text: &str) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            error!(error = %err, "failed to parse message");
            return;
        }
    };

    match frame {
        ClientFrame::Input { data } => {
            if data.is_empty() {
                return;
            }
            if let Err(err) = shell.write_input(data.as_bytes()) {
                error!(error = %err, "failed to write to PTY");
            }
        }
        ClientFrame::Resize { cols, rows } => {
            let size = TermSize::new(cols, rows);
            if !size.is_valid() {
                debug!(cols, rows, "ignoring empty resize");
                return;
            }
            if let Err(err) = shell.resize(size) {
                error!(error = %err, "failed to resize terminal");
            }
        }
        ClientFrame::Unknown => debug!("ignoring unknown frame type"),
    }
}

async fn send_line(ws_tx: &mut SplitSink<WebSocket, Message>, line: &str) -> bool {
    ws_tx.send(Message::Text(format!("{line}\n"))).await.is_ok()
}

async fn report_failure(ws_tx: &mut SplitSink<WebSocket, Message>, err: &SessionError) {
    error!(error = %err, "session setup failed");
    if send_line(ws_tx, &err.to_string()).await {
        if let Some(hint) = err.hint() {
            send_line(ws_tx, hint).await;
        }
    }
    let _ = ws_tx.close().await;
}

pub async fn run_session(socket: WebSocket, settings: Arc<Settings>, request: SessionRequest) {
    let SessionRequest {
        conn_id,
        remote,
        requested_user,
    } = request;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let username = resolve_user(&settings, requested_user.as_deref());
    info!(%conn_id, %remote, user = %username, "run as user");

    let prepared = match lookup_user(&username)
        .and_then(|user| prepare_shell(&settings, &user, remote))
    {
        Ok(prepared) => prepared,
        Err(err) => {
            report_failure(&mut ws_tx, &err).await;
            return;
        }
    };

    let (mut pty, mut output_rx) = match PtyProcess::spawn(&prepared.spec) {
        Ok(spawned) => spawned,
        Err(err) => {
            report_failure(&mut ws_tx, &SessionError::Spawn(err)).await;
            return;
        }
    };
    info!(%conn_id, pid = pty.pid(), shell = %prepared.spec.program, user = %prepared.user, "shell started");

    let mut decoder = Utf8Decoder::default();
    loop {
        tokio::select! {
            event = output_rx.recv() => {
                match event {
                    Some(PtyEvent::Output(bytes)) => {
                        let text = decoder.push(&bytes);
                        if text.is_empty() {
                            continue;
                        }
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            warn!(%conn_id, "failed to send to WebSocket");
                            break;
                        }
                    }
                    Some(PtyEvent::Error(err)) => {
                        error!(%conn_id, error = %err, "failed to read from PTY");
                        send_line(&mut ws_tx, &format!("Failed to read from PTY: {err}")).await;
                        break;
                    }
                    Some(PtyEvent::Closed) | None => {
                        let tail = decoder.finish();
                        if !tail.is_empty() {
                            let _ = ws_tx.send(Message::Text(tail)).await;
                        }
                        info!(%conn_id, status = ?pty.try_exit_status(), "shell exited");
                        break;
                    }
                }
            }
            message = ws_rx.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        warn!(%conn_id, error = %err, "failed to read WebSocket message");
                        break;
                    }
                    None => break,
                };
                match message {
                    Message::Text(text) => apply_frame(&mut pty, &text),
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => apply_frame(&mut pty, text),
                        Err(_) => debug!(%conn_id, "ignoring non-UTF-8 binary frame"),
                    },
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    info!(%conn_id, "closing connection, terminating process");
    pty.terminate();
    let _ = ws_tx.close().await;
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
