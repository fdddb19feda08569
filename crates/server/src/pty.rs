//! Pseudo-terminal ownership for session shells.
//!
//! [`PtyProcess`] starts a program as a session leader on a fresh PTY,
//! optionally as another user. Blocking I/O on the master stays on two
//! dedicated threads: a reader feeding a bounded tokio channel, so a slow
//! client stalls the shell rather than growing a queue, and a writer draining
//! queued input.

use std::{
    fs::File,
    io::{self, Read, Write},
    os::{fd::AsRawFd, unix::process::CommandExt},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
};

use nix::{
    fcntl::{fcntl, FcntlArg, FdFlag},
    pty::{openpty, Winsize},
    unistd::{setsid, Gid, Uid},
};
use shared::domain::TermSize;
use tokio::sync::mpsc;
use tracing::debug;

nix::ioctl_write_ptr_bad!(set_window_size, libc::TIOCSWINSZ, Winsize);

/// Output chunks buffered before the reader thread blocks.
pub const OUTPUT_QUEUE_DEPTH: usize = 64;
/// Input chunks buffered before further input is refused.
pub const INPUT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to allocate PTY: {0}")]
    Open(#[source] nix::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to resize PTY: {0}")]
    Resize(#[source] nix::Error),

    #[error("shell is not reading input, dropped {0} bytes")]
    InputBacklog(usize),

    #[error("PTY input is closed")]
    InputClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Uid,
    pub gid: Gid,
}

#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    pub size: TermSize,
}

#[derive(Debug)]
pub enum PtyEvent {
    Output(Vec<u8>),
    Error(String),
    Closed,
}

pub struct PtyProcess {
    master: File,
    input_tx: mpsc::Sender<Vec<u8>>,
    child: Child,
}

impl PtyProcess {
    pub fn spawn(spec: &SpawnSpec) -> Result<(Self, mpsc::Receiver<PtyEvent>), PtyError> {
        let pty = openpty(&winsize(spec.size), None).map_err(PtyError::Open)?;
        // Neither end may leak into shells spawned for other sessions.
        for fd in [pty.master.as_raw_fd(), pty.slave.as_raw_fd()] {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(PtyError::Open)?;
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::from(pty.slave.try_clone()?))
            .stdout(Stdio::from(pty.slave.try_clone()?))
            .stderr(Stdio::from(pty.slave));
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if let Some(credentials) = spec.credentials {
            command
                .uid(credentials.uid.as_raw())
                .gid(credentials.gid.as_raw());
        }

        // SAFETY: only async-signal-safe calls run between fork and exec.
        unsafe {
            command.pre_exec(|| {
                setsid()?;
                if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(|source| PtyError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        // Our copies of the slave must close so the reader sees the hangup.
        drop(command);

        let master = File::from(pty.master);
        let input_tx = spawn_writer(master.try_clone()?)?;
        let output_rx = spawn_reader(master.try_clone()?)?;

        Ok((
            Self {
                master,
                input_tx,
                child,
            },
            output_rx,
        ))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Queues `data` for the shell without blocking. Input is refused while
    /// the queue is full.
    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        self.input_tx
            .try_send(data.to_vec())
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(data) => PtyError::InputBacklog(data.len()),
                mpsc::error::TrySendError::Closed(_) => PtyError::InputClosed,
            })
    }

    pub fn resize(&self, size: TermSize) -> Result<(), PtyError> {
        let winsize = winsize(size);
        // SAFETY: the fd is an open PTY master and `winsize` outlives the call.
        unsafe { set_window_size(self.master.as_raw_fd(), &winsize) }.map_err(PtyError::Resize)?;
        Ok(())
    }

    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kills the shell and reaps it.
    pub fn terminate(&mut self) {
        if self.try_exit_status().is_some() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn winsize(size: TermSize) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

fn spawn_writer(mut writer: File) -> Result<mpsc::Sender<Vec<u8>>, PtyError> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("pty-writer".into())
        .spawn(move || {
            while let Some(data) = rx.blocking_recv() {
                if let Err(err) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    debug!(error = %err, "PTY input closed");
                    break;
                }
            }
        })?;
    Ok(tx)
}

fn spawn_reader(mut reader: File) -> Result<mpsc::Receiver<PtyEvent>, PtyError> {
    let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.blocking_send(PtyEvent::Closed);
                        break;
                    }
                    Ok(n) => {
                        if tx.blocking_send(PtyEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    // Linux reports a hung-up PTY as EIO once the shell exits.
                    Err(err) if err.raw_os_error() == Some(libc::EIO) => {
                        let _ = tx.blocking_send(PtyEvent::Closed);
                        break;
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(PtyEvent::Error(err.to_string()));
                        let _ = tx.blocking_send(PtyEvent::Closed);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
#[path = "tests/pty_tests.rs"]
mod tests;
