//! # UDP Adapters
//!
//! The loopback control channel to the engine and the listener task that
//! surfaces engine datagrams as `PROCESS_TINCAN_DATA` CBTs.

use crate::domain::{CtrlEndpoint, TincanConfig, TincanError};
use crate::ports::ControlChannel;
use cbt_bus::{Cbt, CbtPayload, CbtRegistry, ModuleName};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Sockets bound for one controller instance.
pub struct ControlSockets {
    pub channel: UdpControlChannel,
    /// Non-blocking socket the engine sends replies to.
    pub listener: StdUdpSocket,
    pub endpoint: CtrlEndpoint,
}

impl ControlSockets {
    /// Bind the reply socket and the request socket on loopback.
    ///
    /// IPv6 is tried first when preferred; if binding fails the IPv4
    /// loopback is used instead.
    ///
    /// # Errors
    ///
    /// Returns `TincanError::Bind` if no address family can be bound.
    pub fn bind(config: &TincanConfig) -> Result<Self, TincanError> {
        if config.prefer_ipv6 {
            match Self::bind_on(IpAddr::V6(config.localhost6), config) {
                Ok(sockets) => return Ok(sockets),
                Err(e) => warn!(error = %e, "IPv6 control socket unavailable, falling back to IPv4"),
            }
        }
        Self::bind_on(IpAddr::V4(config.localhost), config)
    }

    fn bind_on(ip: IpAddr, config: &TincanConfig) -> Result<Self, TincanError> {
        let listen_addr = SocketAddr::new(ip, config.ctrl_recv_port);
        let listener = bind(listen_addr)?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TincanError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        // Port may have been 0; report what the engine must reply to.
        let bound = listener.local_addr().map_err(|source| TincanError::Bind {
            addr: listen_addr.to_string(),
            source,
        })?;

        let unspecified = match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let sender = bind(SocketAddr::new(unspecified, 0))?;
        let engine = SocketAddr::new(ip, config.ctrl_send_port);

        info!(listen = %bound, engine = %engine, "Tincan control sockets bound");
        Ok(Self {
            channel: UdpControlChannel::new(sender, engine),
            listener,
            endpoint: CtrlEndpoint::new(ip, bound.port()),
        })
    }
}

fn bind(addr: SocketAddr) -> Result<StdUdpSocket, TincanError> {
    StdUdpSocket::bind(addr).map_err(|source| TincanError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Blocking UDP sender to the engine's control port.
pub struct UdpControlChannel {
    socket: Arc<StdUdpSocket>,
    engine: SocketAddr,
}

impl UdpControlChannel {
    #[must_use]
    pub fn new(socket: StdUdpSocket, engine: SocketAddr) -> Self {
        Self {
            socket: Arc::new(socket),
            engine,
        }
    }

    #[must_use]
    pub fn engine_addr(&self) -> SocketAddr {
        self.engine
    }
}

impl ControlChannel for UdpControlChannel {
    fn send(&self, datagram: &[u8]) -> Result<(), TincanError> {
        self.socket
            .send_to(datagram, self.engine)
            .map(drop)
            .map_err(TincanError::Transport)
    }
}

/// Background reader of the engine's reply socket.
///
/// Never parses what it reads: each datagram is handed to `owner`'s inbox
/// as `PROCESS_TINCAN_DATA`.
pub struct TincanListener {
    socket: UdpSocket,
    registry: Arc<CbtRegistry>,
    owner: ModuleName,
    buf_size: usize,
    poll: Duration,
}

impl TincanListener {
    /// Wrap a non-blocking std socket. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `TincanError::Bind` if the socket cannot be registered with
    /// the runtime.
    pub fn new(
        socket: StdUdpSocket,
        registry: Arc<CbtRegistry>,
        owner: ModuleName,
        buf_size: usize,
        poll: Duration,
    ) -> Result<Self, TincanError> {
        let addr = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let socket = UdpSocket::from_std(socket).map_err(|source| TincanError::Bind { addr, source })?;
        Ok(Self {
            socket,
            registry,
            owner,
            buf_size: buf_size.max(1),
            poll,
        })
    }

    /// Read datagrams until `shutdown` flips to `true` or its sender drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.buf_size];
        debug!(module = %self.owner, "Tincan listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = tokio::time::timeout(self.poll, self.socket.recv_from(&mut buf)) => {
                    match received {
                        Err(_) => trace!(module = %self.owner, "Listener poll elapsed"),
                        Ok(Ok((len, from))) => {
                            trace!(len, %from, "Tincan datagram received");
                            let cbt = Cbt::new(
                                &self.owner,
                                &self.owner,
                                CbtPayload::ProcessTincanData(buf[..len].to_vec()),
                            );
                            // Failures are logged by the registry.
                            let _ = self.registry.submit(cbt);
                        }
                        Ok(Err(e)) => warn!(error = %e, "Tincan socket receive failed"),
                    }
                }
            }
        }

        debug!(module = %self.owner, "Tincan listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn loopback_config() -> TincanConfig {
        TincanConfig {
            ctrl_recv_port: 0,
            ctrl_send_port: 9,
            prefer_ipv6: false,
            socket_read_wait_ms: 20,
            ..TincanConfig::default()
        }
    }

    #[test]
    fn test_bind_ipv4_loopback() {
        let sockets = ControlSockets::bind(&loopback_config()).unwrap();
        assert_eq!(sockets.endpoint.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(sockets.endpoint.port, 0);
        assert_eq!(sockets.channel.engine_addr().port(), 9);
    }

    #[test]
    fn test_channel_sends_to_engine() {
        let engine = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        engine
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let channel = UdpControlChannel::new(sender, engine.local_addr().unwrap());

        channel.send(b"{\"IPOP\":{}}").unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = engine.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"{\"IPOP\":{}}");
    }

    #[tokio::test]
    async fn test_listener_forwards_datagrams_and_stops() {
        let registry = Arc::new(CbtRegistry::new());
        let mut inbox = registry.register_module("TincanInterface");
        let sockets = ControlSockets::bind(&loopback_config()).unwrap();
        let target = SocketAddr::new(sockets.endpoint.ip, sockets.endpoint.port);

        let listener = TincanListener::new(
            sockets.listener,
            registry.clone(),
            "TincanInterface".into(),
            1024,
            Duration::from_millis(20),
        )
        .unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(stop_rx));

        let engine = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        engine.send_to(b"hello", target).unwrap();

        let cbt = timeout(Duration::from_secs(1), inbox.recv())
            .await
            .expect("timeout")
            .expect("cbt");
        assert_eq!(cbt.action, "PROCESS_TINCAN_DATA");
        assert_eq!(cbt.recipient, "TincanInterface");
        assert_eq!(cbt.data, CbtPayload::ProcessTincanData(b"hello".to_vec()));

        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("listener did not stop")
            .unwrap();
    }
}
