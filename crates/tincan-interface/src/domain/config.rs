//! # Tunnel Engine Configuration
//!
//! Static settings consumed at module initialization: control-channel
//! addresses, overlay descriptors and the logging parameters pushed to the
//! engine. Immutable once the module has started.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Hex characters kept from the SHA-1 digest when deriving a local UID.
pub const LOCAL_UID_HEX_LEN: usize = 10;

/// Derive an overlay's local UID from its virtual IPv4 address.
#[must_use]
pub fn local_uid(ip4: &str) -> String {
    let digest = hex::encode(Sha1::digest(ip4.as_bytes()));
    digest[..LOCAL_UID_HEX_LEN].to_string()
}

/// Control-channel and overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TincanConfig {
    /// IPv4 loopback used when IPv6 is unavailable or not preferred.
    pub localhost: Ipv4Addr,
    /// IPv6 loopback.
    pub localhost6: Ipv6Addr,
    /// Port the controller listens on for engine replies.
    pub ctrl_recv_port: u16,
    /// Port the engine listens on for controller requests.
    pub ctrl_send_port: u16,
    /// Largest datagram read from the engine.
    pub buf_size: usize,
    /// Listener poll timeout in milliseconds.
    pub socket_read_wait_ms: u64,
    pub prefer_ipv6: bool,
    /// STUN endpoints; the first one is handed to every overlay.
    pub stun: Vec<String>,
    /// TURN relays; the first one is handed to every overlay.
    pub turn: Vec<TurnConfig>,
    pub vnets: Vec<VnetConfig>,
}

impl Default for TincanConfig {
    fn default() -> Self {
        Self {
            localhost: Ipv4Addr::LOCALHOST,
            localhost6: Ipv6Addr::LOCALHOST,
            ctrl_recv_port: 5801,
            ctrl_send_port: 5800,
            buf_size: 65507,
            socket_read_wait_ms: 15_000,
            prefer_ipv6: true,
            stun: Vec::new(),
            turn: Vec::new(),
            vnets: Vec::new(),
        }
    }
}

impl TincanConfig {
    #[must_use]
    pub fn socket_read_wait(&self) -> Duration {
        Duration::from_millis(self.socket_read_wait_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub address: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// One configured overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnetConfig {
    pub tap_name: String,
    #[serde(default)]
    pub description: String,
    /// Local virtual IPv4 address.
    pub ip4: String,
    pub ip4_prefix_len: u8,
    #[serde(default)]
    pub mtu4: Option<u32>,
    #[serde(default)]
    pub ip_mapping_enabled: Option<bool>,
    /// Physical interfaces the engine must not tunnel over.
    #[serde(default)]
    pub ignored_net_interfaces: Option<Vec<String>>,
}

impl VnetConfig {
    #[must_use]
    pub fn local_uid(&self) -> String {
        local_uid(&self.ip4)
    }
}

/// Logging parameters forwarded to the engine at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLogging {
    pub level: String,
    /// `Console`, `File` or `All`.
    pub device: String,
    pub directory: String,
    pub filename: String,
    pub max_archives: u32,
    pub max_file_size: u64,
    pub console_level: String,
}

impl Default for EngineLogging {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
            device: "File".into(),
            directory: "./logs/".into(),
            filename: "tincan_log".into(),
            max_archives: 5,
            max_file_size: 1_000_000,
            console_level: "NONE".into(),
        }
    }
}

/// Address family of the reverse control link, as the engine names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "af_inet")]
    Inet,
    #[serde(rename = "af_inetv6")]
    Inet6,
}

impl AddressFamily {
    #[must_use]
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

/// Where the engine should send its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl CtrlEndpoint {
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    #[must_use]
    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.ip)
    }
}
