//! RCON protocol client.
//!
//! [`codec`] holds the pure frame functions; [`client`] owns the socket,
//! the command queue, and the reconnect logic.

pub mod codec;

mod client;

pub use client::{RconClient, RconEvent, DEFAULT_MAX_ATTEMPTS};

use thiserror::Error;

/// Connection lifecycle of an [`RconClient`].
///
/// `send()` is legal in every state (commands queue until dispatch);
/// dispatch itself only proceeds from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; also the terminal state after any socket error
    #[default]
    Disconnected,
    /// A connect attempt (or retry) is outstanding
    Connecting,
    /// Socket open, authentication request sent, waiting for the ack
    Authenticating,
    /// Authenticated; the dispatch tick drains the queue
    Ready,
}

/// Error type for RCON client operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RconError {
    /// `connect()` was called while already authenticated
    #[error("already connected")]
    AlreadyConnected,

    /// The connection was torn down before this command got a response
    #[error("disconnected")]
    Disconnected,

    /// The client task is no longer running
    #[error("client task is gone")]
    ClientGone,
}
