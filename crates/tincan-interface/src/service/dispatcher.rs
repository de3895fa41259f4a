//! # Response Classifier
//!
//! Parses each engine datagram and decides which CBTs, if any, it becomes.
//!
//! ```text
//! datagram ─┬─ Response present ─┬─ Success=false ──────────────→ warn, drop
//!           │                    ├─ QueryNodeInfo ──────────────→ TINCAN_RESPONSE → Initiator
//!           │                    ├─ CreateTunnel ───────────────→ SEND_CAS_DETAILS_TO_PEER → Initiator
//!           │                    ├─ QueryCandidateAddressSet ───→ set_geo_ip (stun only) → Initiator
//!           │                    └─ ConnectTunnel, stats, setup → log only
//!           └─ notification ─────┬─ ICC ──────────→ ArpCache / BroadcastForwarder / TopologyManager
//!                                └─ UpdateRoutes ─→ by EtherType
//! ```
//!
//! Nothing here can fail the caller: every error degrades to a warning and a
//! dropped datagram.

use crate::domain::{classify_dataframe, TincanError};
use crate::protocol::{embedded_json, value_text, InboundEnvelope, ResponseStatus};
use cbt_bus::modules::{ARP_CACHE, BROADCAST_FORWARDER, TOPOLOGY_MANAGER};
use cbt_bus::{
    CasDetails, Cbt, CbtPayload, CbtRegistry, ConnectionResponse, FrameClass, FrameOrigin,
    LocalState, ModuleName, OverlayFrame, OverlayMessage, PeerState, TincanResponse,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Replies that only confirm a setup or teardown step.
const COMPLETION_COMMANDS: [&str; 5] = [
    "CreateCtrlRespLink",
    "ConfigureLogging",
    "CreateVnet",
    "SetIgnoredNetInterfaces",
    "RemovePeer",
];

/// A CBT the classifier wants emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub recipient: ModuleName,
    pub payload: CbtPayload,
}

impl Emission {
    fn new(recipient: impl Into<ModuleName>, payload: CbtPayload) -> Self {
        Self {
            recipient: recipient.into(),
            payload,
        }
    }
}

/// Emits classified datagrams through the registry on behalf of `owner`.
pub struct ResponseDispatcher {
    owner: ModuleName,
    registry: Arc<CbtRegistry>,
}

impl ResponseDispatcher {
    #[must_use]
    pub fn new(owner: ModuleName, registry: Arc<CbtRegistry>) -> Self {
        Self { owner, registry }
    }

    /// Classify and route one datagram. Returns the number of CBTs delivered.
    pub fn dispatch(&self, datagram: &[u8]) -> usize {
        let emissions = match classify_datagram(datagram) {
            Ok(emissions) => emissions,
            Err(e) => {
                warn!(
                    module = %self.owner,
                    error = %e,
                    data = %String::from_utf8_lossy(datagram),
                    "Dropped Tincan datagram"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for emission in emissions {
            let cbt = Cbt::new(&self.owner, emission.recipient, emission.payload);
            if self.registry.submit(cbt).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Decide what one datagram becomes.
///
/// A failed reply yields no emissions. Malformed input, missing keys and
/// unknown commands are errors.
pub fn classify_datagram(datagram: &[u8]) -> Result<Vec<Emission>, TincanError> {
    let envelope = InboundEnvelope::parse(datagram)?;
    let command = envelope.command()?;

    match envelope.response() {
        Some(status) => classify_reply(&envelope, command, status),
        None => classify_notification(&envelope, command),
    }
}

fn classify_reply(
    envelope: &InboundEnvelope,
    command: &str,
    status: &ResponseStatus,
) -> Result<Vec<Emission>, TincanError> {
    if !status.success {
        warn!(
            command,
            transaction_id = ?envelope.ipop.transaction_id,
            message = %status.message_text(),
            "Tincan failure status for request"
        );
        return Ok(Vec::new());
    }

    let interface_name = envelope.interface_name().to_string();

    match command {
        "QueryNodeInfo" => {
            let initiator = envelope.initiator()?;
            let state = node_state(envelope, &status.message_object()?, interface_name)?;
            debug!(initiator, state = ?state, "Node state received");
            Ok(vec![Emission::new(initiator, CbtPayload::TincanResponse(state))])
        }
        "CreateTunnel" => {
            let initiator = envelope.initiator()?;
            let details = CasDetails {
                uid: envelope.peer_info_str("UID").to_string(),
                fpr: envelope.peer_info_str("Fingerprint").to_string(),
                cas: status.message_text(),
                peer_mac: envelope.peer_info_str("MAC").to_string(),
                interface_name,
            };
            info!(peer = %details.uid, interface = %details.interface_name, "Received CAS from Tincan");
            Ok(vec![Emission::new(
                initiator,
                CbtPayload::SendCasDetailsToPeer(details),
            )])
        }
        "ConnectTunnel" => {
            // Decoded for the log; the link manager does not consume it yet.
            let response = ConnectionResponse {
                uid: envelope.peer_info_str("UID").to_string(),
                fpr: envelope.peer_info_str("Fingerprint").to_string(),
                cas: envelope.peer_info_str("CAS").to_string(),
                status: "offline".to_string(),
                interface_name,
            };
            debug!(response = ?TincanResponse::ConnectionResponse(response), "Connection response");
            Ok(Vec::new())
        }
        "QueryCandidateAddressSet" => {
            let message = status.message_object()?;
            let candidate = message
                .get("Controlled")
                .or_else(|| message.get("Controlling"))
                .map(value_text);
            match candidate {
                Some(cas) if cas.contains("stun") => {
                    let initiator = envelope.initiator()?;
                    Ok(vec![Emission::new(
                        initiator,
                        CbtPayload::TincanResponse(TincanResponse::SetGeoIp {
                            interface_name,
                            cas,
                        }),
                    )])
                }
                _ => Ok(Vec::new()),
            }
        }
        "QueryLinkStats" => {
            let stats = status.message_object()?;
            info!(interface = %interface_name, stats = %serde_json::Value::Object(stats), "Link stats");
            Ok(Vec::new())
        }
        c if COMPLETION_COMMANDS.contains(&c) => {
            info!(command = c, status = %status.message_text(), "Tincan task completed");
            Ok(Vec::new())
        }
        other => Err(TincanError::UnknownCommand(other.to_string())),
    }
}

fn node_state(
    envelope: &InboundEnvelope,
    message: &Map<String, Value>,
    interface_name: String,
) -> Result<TincanResponse, TincanError> {
    let field = |key: &'static str| {
        message
            .get(key)
            .map(value_text)
            .ok_or(TincanError::MissingField(key))
    };

    if message.get("Type").and_then(Value::as_str) == Some("local") {
        return Ok(TincanResponse::LocalState(LocalState {
            uid: field("UID")?,
            ip4: field("VIP4")?,
            fpr: field("Fingerprint")?,
            mac: field("MAC")?,
            interface_name,
        }));
    }

    let uid = envelope.request_str("UID").unwrap_or_default().to_string();
    let status = field("Status")?;
    let state = if status == "unknown" {
        PeerState {
            uid,
            status,
            interface_name,
            ..PeerState::default()
        }
    } else {
        PeerState {
            uid,
            ip4: field("VIP4")?,
            fpr: field("Fingerprint")?,
            mac: field("MAC")?,
            ttl: String::new(),
            rate: String::new(),
            status,
            interface_name,
        }
    };
    Ok(TincanResponse::PeerState(state))
}

fn classify_notification(
    envelope: &InboundEnvelope,
    command: &str,
) -> Result<Vec<Emission>, TincanError> {
    match command {
        "ICC" => classify_icc(envelope),
        "UpdateRoutes" => classify_local_frame(envelope),
        other => Err(TincanError::UnknownCommand(other.to_string())),
    }
}

fn classify_icc(envelope: &InboundEnvelope) -> Result<Vec<Emission>, TincanError> {
    let interface_name = envelope.interface_name().to_string();
    let data = envelope
        .ipop
        .request
        .get("Data")
        .ok_or(TincanError::MissingField("Request.Data"))?;
    let Value::Object(mut icc) = embedded_json(data)? else {
        return Err(TincanError::Malformed("ICC data is not an object".into()));
    };
    debug!(interface = %interface_name, "ICC message received");

    let Some(msg) = icc.remove("msg") else {
        icc.insert("interface_name".into(), interface_name.clone().into());
        return Ok(vec![Emission::new(
            TOPOLOGY_MANAGER,
            CbtPayload::IccControl(remote_message(interface_name, icc)),
        )]);
    };
    let Value::Object(mut msg) = msg else {
        return Err(TincanError::Malformed("ICC msg is not an object".into()));
    };
    msg.insert("type".into(), "remote".into());
    msg.insert("interface_name".into(), interface_name.clone().into());

    let message_type = msg
        .get("message_type")
        .and_then(Value::as_str)
        .map(str::to_owned);

    match message_type.as_deref() {
        Some("BroadcastPkt") => {
            let dataframe = msg
                .remove("dataframe")
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or(TincanError::MissingField("msg.dataframe"))?;
            let class = classify_dataframe(&dataframe);
            let frame = OverlayFrame {
                interface_name,
                origin: FrameOrigin::Remote,
                class,
                dataframe,
                metadata: msg,
            };
            Ok(vec![if class == FrameClass::Arp {
                Emission::new(ARP_CACHE, CbtPayload::ArpPacket(frame))
            } else {
                Emission::new(BROADCAST_FORWARDER, CbtPayload::BroadcastPkt(frame))
            }])
        }
        Some("BroadcastData") => {
            let mut emissions = Vec::with_capacity(2);
            match msg.get("dataframe").map(embedded_json) {
                Some(Ok(Value::Object(mut control))) => {
                    if control.get("message_type").and_then(Value::as_str) == Some("SendMacDetails") {
                        control.insert("interface_name".into(), interface_name.clone().into());
                        emissions.push(Emission::new(
                            ARP_CACHE,
                            CbtPayload::PeerMacIpDetails(remote_message(interface_name.clone(), control)),
                        ));
                    }
                }
                Some(Ok(_)) => warn!(interface = %interface_name, "BroadcastData payload is not an object"),
                Some(Err(e)) => warn!(interface = %interface_name, error = %e, "Undecodable BroadcastData payload"),
                None => warn!(interface = %interface_name, "BroadcastData without dataframe"),
            }
            emissions.push(Emission::new(
                BROADCAST_FORWARDER,
                CbtPayload::BroadcastData(remote_message(interface_name, msg)),
            ));
            Ok(emissions)
        }
        Some(_) => Ok(vec![Emission::new(
            TOPOLOGY_MANAGER,
            CbtPayload::IccControl(remote_message(interface_name, msg)),
        )]),
        None => Ok(vec![Emission::new(
            BROADCAST_FORWARDER,
            CbtPayload::BroadcastData(remote_message(interface_name, msg)),
        )]),
    }
}

fn classify_local_frame(envelope: &InboundEnvelope) -> Result<Vec<Emission>, TincanError> {
    let dataframe = envelope
        .request_str("Data")
        .ok_or(TincanError::MissingField("Request.Data"))?
        .to_string();
    let class = classify_dataframe(&dataframe);
    let frame = OverlayFrame {
        interface_name: envelope.interface_name().to_string(),
        origin: FrameOrigin::Local,
        class,
        dataframe,
        metadata: Map::new(),
    };
    debug!(interface = %frame.interface_name, class = ?class, "Tincan packet received");

    Ok(vec![match class {
        FrameClass::Ip => Emission::new(TOPOLOGY_MANAGER, CbtPayload::TincanPacket(frame)),
        FrameClass::Arp => Emission::new(ARP_CACHE, CbtPayload::ArpPacket(frame)),
        FrameClass::Other => Emission::new(BROADCAST_FORWARDER, CbtPayload::BroadcastPkt(frame)),
    }])
}

fn remote_message(interface_name: String, body: Map<String, Value>) -> OverlayMessage {
    OverlayMessage {
        interface_name,
        origin: FrameOrigin::Remote,
        body,
    }
}
