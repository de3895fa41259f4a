//! # CBT Payloads
//!
//! One variant per CBT action. The action tag of a CBT is derived from its
//! payload, so a recipient that matches on `CbtPayload` gets compile-time
//! exhaustiveness over everything it can be sent.
//!
//! Request payloads keep every field optional: a module that forgets a field
//! produces a request with that field omitted, never a crash.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// All payloads that travel between controller modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CbtPayload {
    // =========================================================================
    // TUNNEL REQUESTS (consumed by the tunnel interface)
    // =========================================================================
    /// Connect a tunnel to a peer whose CAS is known.
    CreateLink(LinkRequest),
    /// Remove the link to a peer.
    TrimLink(LinkQuery),
    /// Query local or peer node state.
    GetState(LinkQuery),
    /// Create a tunnel endpoint and obtain the local CAS for a peer.
    GetCas(LinkRequest),
    /// Keep-alive on the control channel.
    Echo { interface_name: Option<String> },
    /// Send an inter-controller message across the overlay.
    SendIccMsg(IccRequest),
    /// Inject a frame into the local virtual interface.
    InsertDataPacket(DataPacket),
    /// Install forwarding rules, one per destination MAC.
    InsertForwardingRules(ForwardingRules),
    /// Remove a forwarding rule.
    RemoveForwardingRules(ForwardingRuleRemoval),
    /// Pass a caller-built envelope through to the engine.
    SendTincanMsg(Value),
    QueryLinkStats(LinkQuery),
    QueryAddressSet(LinkQuery),
    /// Raw datagram captured by the tunnel listener.
    ProcessTincanData(Vec<u8>),

    // =========================================================================
    // TUNNEL EVENTS (emitted by the tunnel interface)
    // =========================================================================
    /// Reply to a state or address-set query.
    TincanResponse(TincanResponse),
    /// Local CAS ready to be sent to the peer.
    SendCasDetailsToPeer(CasDetails),
    ArpPacket(OverlayFrame),
    PeerMacIpDetails(OverlayMessage),
    BroadcastPkt(OverlayFrame),
    BroadcastData(OverlayMessage),
    IccControl(OverlayMessage),
    /// IPv4/IPv6 frame read from the local virtual interface.
    TincanPacket(OverlayFrame),
}

impl CbtPayload {
    /// Action tag carried by CBTs with this payload.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateLink(_) => "DO_CREATE_LINK",
            Self::TrimLink(_) => "DO_TRIM_LINK",
            Self::GetState(_) => "DO_GET_STATE",
            Self::GetCas(_) => "DO_GET_CAS",
            Self::Echo { .. } => "DO_ECHO",
            Self::SendIccMsg(_) => "DO_SEND_ICC_MSG",
            Self::InsertDataPacket(_) => "DO_INSERT_DATA_PACKET",
            Self::InsertForwardingRules(_) => "DO_INSERT_FORWARDING_RULES",
            Self::RemoveForwardingRules(_) => "DO_REMOVE_FORWARDING_RULES",
            Self::SendTincanMsg(_) => "DO_SEND_TINCAN_MSG",
            Self::QueryLinkStats(_) => "DO_QUERY_LINK_STATS",
            Self::QueryAddressSet(_) => "DO_QUERY_ADDRESS_SET",
            Self::ProcessTincanData(_) => "PROCESS_TINCAN_DATA",
            Self::TincanResponse(_) => "TINCAN_RESPONSE",
            Self::SendCasDetailsToPeer(_) => "SEND_CAS_DETAILS_TO_PEER",
            Self::ArpPacket(_) => "ARPPacket",
            Self::PeerMacIpDetails(_) => "PeerMACIPDetails",
            Self::BroadcastPkt(_) => "BroadcastPkt",
            Self::BroadcastData(_) => "BroadcastData",
            Self::IccControl(_) => "ICC_CONTROL",
            Self::TincanPacket(_) => "TINCAN_PACKET",
        }
    }
}

/// Peer attributes used when building or connecting a tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub ip4: Option<String>,
    pub mac: Option<String>,
    pub cas: Option<String>,
    /// Certificate fingerprint.
    pub fpr: Option<String>,
}

/// Payload of `DO_CREATE_LINK` and `DO_GET_CAS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub interface_name: Option<String>,
    /// Peer unique id.
    pub uid: Option<String>,
    pub peer: PeerDescriptor,
}

/// Payload of the per-link queries and `DO_TRIM_LINK`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkQuery {
    pub interface_name: Option<String>,
    pub uid: Option<String>,
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IccRequest {
    pub interface_name: Option<String>,
    pub dst_uid: Option<String>,
    pub dst_mac: Option<String>,
    /// Structured message; sent to the engine as JSON text.
    pub msg: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    pub interface_name: Option<String>,
    /// Hex-encoded Ethernet frame.
    pub dataframe: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRules {
    pub interface_name: Option<String>,
    pub source_mac: String,
    pub dest_macs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRuleRemoval {
    pub interface_name: Option<String>,
    pub mac: String,
}

/// Replies routed back to the module named in the request's initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TincanResponse {
    LocalState(LocalState),
    PeerState(PeerState),
    /// A server-reflexive candidate was found; lets the initiator resolve
    /// the node's public address.
    SetGeoIp { interface_name: String, cas: String },
    /// Built for `ConnectTunnel` replies. Not currently emitted.
    #[serde(rename = "con_resp")]
    ConnectionResponse(ConnectionResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub uid: String,
    pub ip4: String,
    pub fpr: String,
    pub mac: String,
    pub interface_name: String,
}

/// State of the link to a remote peer. When the engine reports status
/// `unknown`, every transport field is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    pub uid: String,
    pub ip4: String,
    pub fpr: String,
    pub mac: String,
    pub ttl: String,
    pub rate: String,
    pub status: String,
    pub interface_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub uid: String,
    pub fpr: String,
    pub cas: String,
    pub status: String,
    pub interface_name: String,
}

/// Payload of `SEND_CAS_DETAILS_TO_PEER`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasDetails {
    pub uid: String,
    pub fpr: String,
    pub cas: String,
    pub peer_mac: String,
    pub interface_name: String,
}

/// Where a frame or message entered the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    /// Read from the local virtual interface.
    Local,
    /// Relayed from a peer controller over ICC.
    Remote,
}

/// Classification of an Ethernet frame by its EtherType.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameClass {
    /// IPv4 or IPv6.
    Ip,
    Arp,
    /// Anything else; flooded to the overlay.
    Other,
}

/// A data frame routed to the ARP cache, broadcast forwarder or topology
/// manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayFrame {
    pub interface_name: String,
    pub origin: FrameOrigin,
    pub class: FrameClass,
    /// Hex-encoded Ethernet frame.
    pub dataframe: String,
    /// Remaining fields of the relayed message (empty for local frames).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A structured control message relayed across the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayMessage {
    pub interface_name: String,
    pub origin: FrameOrigin,
    pub body: Map<String, Value>,
}

impl OverlayMessage {
    /// The `message_type` field of the body, if present.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.body.get("message_type").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_action_names() {
        assert_eq!(
            CbtPayload::CreateLink(LinkRequest::default()).action(),
            "DO_CREATE_LINK"
        );
        assert_eq!(
            CbtPayload::InsertForwardingRules(ForwardingRules::default()).action(),
            "DO_INSERT_FORWARDING_RULES"
        );
        assert_eq!(
            CbtPayload::ProcessTincanData(Vec::new()).action(),
            "PROCESS_TINCAN_DATA"
        );
    }

    #[test]
    fn test_event_action_names() {
        let frame = OverlayFrame {
            interface_name: "ipop_tap0".into(),
            origin: FrameOrigin::Local,
            class: FrameClass::Arp,
            dataframe: String::new(),
            metadata: Map::new(),
        };
        assert_eq!(CbtPayload::ArpPacket(frame.clone()).action(), "ARPPacket");
        assert_eq!(CbtPayload::TincanPacket(frame).action(), "TINCAN_PACKET");
    }

    #[test]
    fn test_tincan_response_type_tags() {
        let local = TincanResponse::LocalState(LocalState::default());
        assert_eq!(serde_json::to_value(&local).unwrap()["type"], "local_state");

        let geo = TincanResponse::SetGeoIp {
            interface_name: "ipop_tap0".into(),
            cas: "stun".into(),
        };
        assert_eq!(serde_json::to_value(&geo).unwrap()["type"], "set_geo_ip");

        let con = TincanResponse::ConnectionResponse(ConnectionResponse::default());
        assert_eq!(serde_json::to_value(&con).unwrap()["type"], "con_resp");
    }

    #[test]
    fn test_overlay_message_type() {
        let body = json!({"message_type": "SendMacDetails", "src_uid": "a1"});
        let msg = OverlayMessage {
            interface_name: "ipop_tap0".into(),
            origin: FrameOrigin::Remote,
            body: body.as_object().cloned().unwrap(),
        };
        assert_eq!(msg.message_type(), Some("SendMacDetails"));
    }
}
