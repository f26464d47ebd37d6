//! Error types for respline
//!
//! Provides a unified error type for all client operations.

use thiserror::Error;

use crate::network::ConnectionState;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Unified error type for respline operations
#[derive(Debug, Error)]
pub enum ClientError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Connection Lifecycle Errors
    // -------------------------------------------------------------------------
    /// The transport could not be established.
    #[error("connect error: {0}")]
    Connect(#[source] std::io::Error),

    /// An established connection failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// Outcome delivered to commands still pending when the connection went away.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("invalid state {state:?} for {operation}")]
    InvalidState {
        state: ConnectionState,
        operation: &'static str,
    },

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    /// Submit was called while the connection is not established.
    #[error("command rejected: not connected")]
    NotConnected,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A reply arrived with no pending command to receive it.
    #[error("protocol desync: reply received with no pending command")]
    ProtocolDesync,

    // -------------------------------------------------------------------------
    // Event Loop Errors
    // -------------------------------------------------------------------------
    #[error("event loop stopped")]
    LoopStopped,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Fatal errors stop the event loop instead of triggering a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::ProtocolDesync)
    }
}
