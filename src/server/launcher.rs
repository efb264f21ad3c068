//! Spawn and signal the supervised server process.
//!
//! The child runs with fully piped stdio. Its stdout and stderr are
//! pumped line by line into one combined channel, and a watcher task
//! reports the exit status; the caller never touches the `Child` itself.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

/// How hard to bring the process down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM: let the server shut itself down
    Graceful,
    /// SIGKILL
    Forceful,
}

/// A running supervised process
pub struct ServerHandle {
    /// Process id, usable with [`terminate`]
    pub pid: u32,
    /// The child's stdin; keep it alive for the process lifetime, some
    /// servers treat console EOF as a shutdown request
    pub stdin: ChildStdin,
    /// Combined stdout and stderr, one console line per message
    pub lines: mpsc::UnboundedReceiver<String>,
    /// Resolves once when the process exits, by any cause
    pub exit: oneshot::Receiver<ExitStatus>,
}

/// Spawn the server process in `dir` with piped stdio.
pub fn spawn_server(executable: &str, args: &[String], dir: &Path) -> Result<ServerHandle> {
    let mut child = Command::new(executable)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {executable}"))?;

    let pid = child.id().context("spawned process has no pid")?;
    let stdin = child.stdin.take().context("child stdin not piped")?;
    let stdout = child.stdout.take().context("child stdout not piped")?;
    let stderr = child.stderr.take().context("child stderr not piped")?;

    let (line_tx, lines) = mpsc::unbounded_channel();

    let tx = line_tx.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let tx = line_tx;
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let (exit_tx, exit) = oneshot::channel();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let _ = exit_tx.send(status);
            }
            Err(e) => tracing::warn!("failed to wait for server process: {e}"),
        }
    });

    tracing::debug!(pid, executable, "spawned server process");
    Ok(ServerHandle {
        pid,
        stdin,
        lines,
        exit,
    })
}

/// Signal the process identified by `pid`.
pub fn terminate(pid: u32, termination: Termination) -> Result<()> {
    let sig = match termination {
        Termination::Graceful => Signal::SIGTERM,
        Termination::Forceful => Signal::SIGKILL,
    };
    signal::kill(Pid::from_raw(pid as i32), sig)
        .with_context(|| format!("failed to signal pid {pid}"))
}
