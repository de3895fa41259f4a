//! # Domain Errors
//!
//! Error types for the tunnel engine control path.

use thiserror::Error;

/// Tunnel interface error types.
#[derive(Debug, Error)]
pub enum TincanError {
    /// A control socket could not be bound.
    #[error("Failed to bind control socket {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending a datagram to the engine failed.
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// A request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound datagram or embedded message is not valid JSON.
    #[error("Failed to decode datagram: {0}")]
    Decode(#[source] serde_json::Error),

    /// A key the classifier needs is absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The envelope has the wrong shape.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// The engine echoed a command this controller does not handle.
    #[error("Unrecognized command: {0}")]
    UnknownCommand(String),
}
