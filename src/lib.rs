//! Supervise a Minecraft server process and control it over RCON.
//!
//! [`GameServer`] launches the server, generates its `server.properties`
//! and `eula.txt`, classifies its console output against configurable
//! patterns, and wires the classified lifecycle events to an
//! [`RconClient`]: when the server reports it is up, the client connects
//! and authenticates; on stop or crash it disconnects and rejects every
//! pending command. Commands submitted with [`GameServer::send`] queue
//! in FIFO order and dispatch one per tick over the RCON socket, each
//! response correlated back to its caller by request id.
//!
//! ```no_run
//! use warden::{GameServer, ServerConfig, ServerConfigPatch};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::merged(ServerConfigPatch {
//!         eula: Some(true),
//!         ..Default::default()
//!     })?;
//!
//!     let server = GameServer::new(config);
//!     server.start()?;
//!
//!     let mut events = server.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod events;
pub mod rcon;
pub mod server;

pub use config::{
    ConfigError, EventPatternSet, EventPatternsPatch, LineCategory, PropertyValue, RconConfig,
    RconConfigPatch, ServerConfig, ServerConfigPatch, ServerProperties,
};
pub use events::EventBus;
pub use rcon::{ConnectionState, RconClient, RconError, RconEvent};
pub use server::{GameServer, LifecycleState, ServerError, ServerEvent};
