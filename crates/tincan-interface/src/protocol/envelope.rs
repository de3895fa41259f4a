//! # Outbound Request Envelope
//!
//! Every request to the engine is one JSON object per datagram:
//!
//! ```text
//! {"IPOP": {"ProtocolVersion": 4, "ControlType": "TincanRequest",
//!           "TransactionId": 7, "Request": {"Command": "QueryNodeInfo", ...}}}
//! ```

use crate::domain::AddressFamily;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 4;
pub const CONTROL_TYPE_REQUEST: &str = "TincanRequest";
/// Transport protocol of the reverse control link.
pub const PROTO_DATAGRAM: &str = "proto_datagram";
/// Destination MAC that never receives a forwarding rule.
pub const BROADCAST_MAC: &str = "000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "IPOP")]
    pub ipop: RequestHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestHeader {
    pub protocol_version: u32,
    pub control_type: String,
    pub transaction_id: u64,
    /// Module that owns the reply; only set for stats and address-set queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub request: TincanRequest,
}

impl RequestEnvelope {
    #[must_use]
    pub fn new(transaction_id: u64, owner: Option<String>, request: TincanRequest) -> Self {
        Self {
            ipop: RequestHeader {
                protocol_version: PROTOCOL_VERSION,
                control_type: CONTROL_TYPE_REQUEST.to_string(),
                transaction_id,
                owner,
                request,
            },
        }
    }
}

/// One variant per engine command. The variant name is the `Command` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Command")]
pub enum TincanRequest {
    ConnectTunnel(TunnelRequest),
    CreateTunnel(TunnelRequest),
    RemovePeer(RemovePeer),
    QueryNodeInfo(NodeQuery),
    QueryLinkStats(NodeQuery),
    QueryCandidateAddressSet(NodeQuery),
    EchoRequest(EchoRequest),
    #[serde(rename = "SendICC")]
    SendIcc(SendIcc),
    InjectFrame(InjectFrame),
    AddRoutes(RouteUpdate),
    RemoveRoutes(RouteUpdate),
    CreateCtrlRespLink(CtrlRespLink),
    ConfigureLogging(ConfigureLogging),
    CreateVnet(CreateVnet),
    SetIgnoredNetInterfaces(IgnoredInterfaces),
}

impl TincanRequest {
    /// Wire name of the command.
    #[must_use]
    pub fn command(&self) -> &'static str {
        match self {
            Self::ConnectTunnel(_) => "ConnectTunnel",
            Self::CreateTunnel(_) => "CreateTunnel",
            Self::RemovePeer(_) => "RemovePeer",
            Self::QueryNodeInfo(_) => "QueryNodeInfo",
            Self::QueryLinkStats(_) => "QueryLinkStats",
            Self::QueryCandidateAddressSet(_) => "QueryCandidateAddressSet",
            Self::EchoRequest(_) => "EchoRequest",
            Self::SendIcc(_) => "SendICC",
            Self::InjectFrame(_) => "InjectFrame",
            Self::AddRoutes(_) => "AddRoutes",
            Self::RemoveRoutes(_) => "RemoveRoutes",
            Self::CreateCtrlRespLink(_) => "CreateCtrlRespLink",
            Self::ConfigureLogging(_) => "ConfigureLogging",
            Self::CreateVnet(_) => "CreateVnet",
            Self::SetIgnoredNetInterfaces(_) => "SetIgnoredNetInterfaces",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(rename = "VIP4", skip_serializing_if = "Option::is_none")]
    pub vip4: Option<String>,
    #[serde(rename = "UID", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "MAC", skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(rename = "CAS", skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
    #[serde(rename = "Fingerprint", skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Body of `ConnectTunnel` and `CreateTunnel`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TunnelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    pub peer_info: PeerInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemovePeer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    #[serde(rename = "MAC", skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// Body of the node-info, link-stats and address-set queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeQuery {
    pub protocol_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(rename = "UID", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "MAC", skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EchoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendIcc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    /// Destination peer UID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_mac: Option<String>,
    /// The message as JSON text.
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InjectFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    pub data: String,
}

/// Body of `AddRoutes` (`"<dst>:<src>"` entries) and `RemoveRoutes` (MACs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CtrlRespLink {
    pub address_family: AddressFamily,
    pub protocol: String,
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigureLogging {
    pub level: String,
    pub device: String,
    pub directory: String,
    pub filename: String,
    pub max_archives: u32,
    pub max_file_size: u64,
    pub console_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVnet {
    pub interface_name: String,
    pub description: String,
    #[serde(rename = "LocalVirtIP4")]
    pub local_virt_ip4: String,
    pub local_prefix4: u8,
    #[serde(rename = "MTU4", skip_serializing_if = "Option::is_none")]
    pub mtu4: Option<u32>,
    #[serde(rename = "LocalUID")]
    pub local_uid: String,
    pub stun_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_pass: Option<String>,
    #[serde(rename = "IPMappingEnabled", skip_serializing_if = "Option::is_none")]
    pub ip_mapping_enabled: Option<bool>,
    pub l2_tunnel_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IgnoredInterfaces {
    pub interface_name: String,
    pub ignored_net_interfaces: Vec<String>,
}
