//! Process supervision and log-driven lifecycle.
//!
//! [`GameServer`] launches the configured server process, splits its
//! combined output into lines, classifies each line against the active
//! pattern set, and drives the RCON client from the classified events:
//! a `Start` line connects it, `Stop` and `Crash` lines disconnect it.
//! Process exit by any cause converges on one cleanup path, so the
//! client can never stay `Ready` against a dead process.

mod eula;
mod launcher;
mod properties;

pub use eula::write_eula;
pub use launcher::{spawn_server, terminate, ServerHandle, Termination};
pub use properties::write_properties;

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::process::ChildStdin;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::{LineCategory, ServerConfig};
use crate::events::EventBus;
use crate::rcon::{ConnectionState, RconClient, RconError};

/// Supervisor-level lifecycle, driven by classified console lines,
/// explicit `stop()` calls, and process exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    NotStarted,
    /// A `Start` line was classified; the server accepts connections
    Running,
    /// A `Stop` line was classified or `stop()` was called
    Stopping,
    /// The process exited without a classified crash
    Stopped,
    /// A `Crash` line was classified; sticky across the process exit
    Crashed,
}

/// Error type for supervisor operations
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start()` was called while a process is already supervised
    #[error("server already running")]
    AlreadyRunning,

    /// The operation needs a supervised process and there is none
    #[error("server not running")]
    NotRunning,

    /// The configured working directory does not exist
    #[error("working directory does not exist: {}", .0.display())]
    MissingWorkingDir(PathBuf),

    /// The configured server jar does not exist
    #[error("server jar does not exist: {}", .0.display())]
    MissingServerJar(PathBuf),

    /// Config generation, spawning, or signalling failed
    #[error("launch failed: {0}")]
    Launch(#[from] anyhow::Error),

    /// The console client rejected the operation
    #[error(transparent)]
    Rcon(#[from] RconError),
}

/// Events emitted by a [`GameServer`]
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// One raw console line from the supervised process
    Console { line: String },
    /// A line matched the start pattern
    Start { line: String },
    /// A line matched the stop pattern
    Stop { line: String },
    /// A line matched the crash pattern
    Crash { line: String },
    /// A line matched the EULA-refusal pattern
    Eula { line: String },
    /// The supervised process exited
    Exited { code: Option<i32> },
}

#[derive(Default)]
struct RunState {
    pid: Option<u32>,
    lifecycle: LifecycleState,
}

/// Supervises one server process and its RCON channel.
///
/// Cloning is cheap; clones share the same supervised process and
/// console client. Must be created from within a Tokio runtime.
#[derive(Clone)]
pub struct GameServer {
    config: Arc<ServerConfig>,
    rcon: RconClient,
    events: EventBus<ServerEvent>,
    state: Arc<RwLock<RunState>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let rcon = RconClient::new(config.rcon.clone());
        let server = Self {
            config: Arc::new(config),
            rcon,
            events: EventBus::default(),
            state: Arc::new(RwLock::new(RunState::default())),
        };
        server.spawn_bridge();
        server
    }

    /// Launch the supervised process.
    ///
    /// Preconditions are reported synchronously before any side effect:
    /// a process already supervised, a missing working directory, or a
    /// missing server jar. Then `server.properties` and `eula.txt` are
    /// generated (failure here is fatal to the start), the process is
    /// spawned, and the console classifier attaches to its output.
    pub fn start(&self) -> Result<(), ServerError> {
        if self.state.read().pid.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let dir = self.config.path.as_path();
        if !dir.is_dir() {
            return Err(ServerError::MissingWorkingDir(dir.to_path_buf()));
        }
        let jar = dir.join(&self.config.jar);
        if !jar.is_file() {
            return Err(ServerError::MissingServerJar(jar));
        }

        properties::write_properties(dir, &self.config)?;
        eula::write_eula(dir, self.config.eula)?;

        let args = launch_args(&self.config);
        let handle = launcher::spawn_server(&self.config.executable, &args, dir)?;
        tracing::info!(pid = handle.pid, "server process started");

        self.state.write().pid = Some(handle.pid);
        self.spawn_line_pump(handle.lines);
        self.spawn_exit_watch(handle.stdin, handle.exit);
        Ok(())
    }

    /// Stop the supervised server.
    ///
    /// Prefers the graceful path: with an authenticated console client
    /// the textual `stop` command is sent and the server's own exit
    /// triggers cleanup. Without one, the process is signalled directly.
    pub fn stop(&self) -> Result<(), ServerError> {
        let pid = self.state.read().pid.ok_or(ServerError::NotRunning)?;
        self.state.write().lifecycle = LifecycleState::Stopping;

        if self.rcon.state() == ConnectionState::Ready {
            let rcon = self.rcon.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                if rcon.send("stop").await.is_err() {
                    // The command never reached the server; force the
                    // process down if it is still tracked.
                    if state.read().pid == Some(pid) {
                        if let Err(e) = launcher::terminate(pid, Termination::Forceful) {
                            tracing::warn!("failed to terminate server: {e}");
                        }
                    }
                }
            });
        } else {
            launcher::terminate(pid, Termination::Graceful)?;
        }
        Ok(())
    }

    /// Send a console command over RCON and await its response.
    ///
    /// Fails synchronously with [`ServerError::NotRunning`] when no
    /// process is supervised, so callers cannot queue against a server
    /// that will never answer.
    pub async fn send(&self, command: impl Into<String>) -> Result<String, ServerError> {
        if self.state.read().pid.is_none() {
            return Err(ServerError::NotRunning);
        }
        Ok(self.rcon.send(command).await?)
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.state.read().lifecycle
    }

    /// The console client owned by this supervisor
    pub fn rcon(&self) -> &RconClient {
        &self.rcon
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Wire classified lifecycle events to the console client: `Start`
    /// connects, `Stop` and `Crash` disconnect.
    fn spawn_bridge(&self) {
        let mut rx = self.events.subscribe();
        let rcon = self.rcon.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ServerEvent::Start { .. }) => {
                        if let Err(e) = rcon.connect().await {
                            tracing::debug!("rcon connect skipped: {e}");
                        }
                    }
                    Ok(ServerEvent::Stop { .. }) | Ok(ServerEvent::Crash { .. }) => {
                        rcon.disconnect().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn spawn_line_pump(&self, mut lines: mpsc::UnboundedReceiver<String>) {
        let server = self.clone();
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                server.ingest_console_line(line);
            }
        });
    }

    /// Emit the raw console event, then one event per matching category.
    /// Categories are independent: a line may emit several.
    fn ingest_console_line(&self, line: String) {
        self.events.emit(ServerEvent::Console { line: line.clone() });

        for category in self.config.event_patterns.classify(&line) {
            match category {
                LineCategory::Start => {
                    self.state.write().lifecycle = LifecycleState::Running;
                    self.events.emit(ServerEvent::Start { line: line.clone() });
                }
                LineCategory::Stop => {
                    self.state.write().lifecycle = LifecycleState::Stopping;
                    self.events.emit(ServerEvent::Stop { line: line.clone() });
                }
                LineCategory::Crash => {
                    self.state.write().lifecycle = LifecycleState::Crashed;
                    self.events.emit(ServerEvent::Crash { line: line.clone() });
                }
                LineCategory::Eula => {
                    self.events.emit(ServerEvent::Eula { line: line.clone() });
                }
            }
        }
    }

    fn spawn_exit_watch(&self, stdin: ChildStdin, exit: oneshot::Receiver<ExitStatus>) {
        let events = self.events.clone();
        let state = self.state.clone();
        let rcon = self.rcon.clone();
        tokio::spawn(async move {
            // Hold stdin open for the child's lifetime; an early drop
            // reads as console EOF on some servers.
            let _stdin = stdin;
            let status = exit.await.ok();

            {
                let mut run = state.write();
                run.pid = None;
                if run.lifecycle != LifecycleState::Crashed {
                    run.lifecycle = LifecycleState::Stopped;
                }
            }

            // A dead process must never leave the client Ready
            rcon.disconnect().await;
            let code = status.and_then(|s| s.code());
            tracing::info!(?code, "server process exited");
            events.emit(ServerEvent::Exited { code });
        });
    }
}

/// Assemble the argv for the server process: configured JVM arguments,
/// then the jar in headless mode.
fn launch_args(config: &ServerConfig) -> Vec<String> {
    let mut args = config.args.clone();
    args.push("-jar".to_string());
    args.push(config.jar.clone());
    args.push("nogui".to_string());
    args
}
