//! # Driven Ports
//!
//! Interfaces the tunnel interface requires from its host.

use crate::domain::TincanError;

/// Outbound datagram channel to the tunnel engine.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct Loopback { socket: std::net::UdpSocket, engine: std::net::SocketAddr }
///
/// impl ControlChannel for Loopback {
///     fn send(&self, datagram: &[u8]) -> Result<(), TincanError> {
///         self.socket.send_to(datagram, self.engine).map(drop).map_err(TincanError::Transport)
///     }
/// }
/// ```
pub trait ControlChannel: Send + Sync {
    /// Send one datagram. Never retried by the caller.
    fn send(&self, datagram: &[u8]) -> Result<(), TincanError>;
}
