//! # Tunnel Protocol Client
//!
//! Turns command payloads into request envelopes and sends each one as a
//! single datagram. Every datagram gets the next transaction id; nothing is
//! retried.

use crate::domain::{
    CtrlEndpoint, EngineLogging, TincanError, TransactionCounter, TurnConfig, VnetConfig,
};
use crate::ports::ControlChannel;
use crate::protocol::{
    ConfigureLogging, CreateVnet, CtrlRespLink, EchoRequest, IgnoredInterfaces, InjectFrame,
    NodeQuery, PeerInfo, RemovePeer, RequestEnvelope, RouteUpdate, SendIcc, TincanRequest,
    TunnelRequest, BROADCAST_MAC, PROTOCOL_VERSION, PROTO_DATAGRAM,
};
use cbt_bus::{
    DataPacket, ForwardingRuleRemoval, ForwardingRules, IccRequest, LinkQuery, LinkRequest,
    ModuleName,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TincanClient {
    channel: Arc<dyn ControlChannel>,
    transactions: Arc<TransactionCounter>,
}

impl TincanClient {
    #[must_use]
    pub fn new(channel: Arc<dyn ControlChannel>, transactions: Arc<TransactionCounter>) -> Self {
        Self {
            channel,
            transactions,
        }
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionCounter {
        &self.transactions
    }

    fn send(&self, owner: Option<&ModuleName>, request: TincanRequest) -> Result<u64, TincanError> {
        let command = request.command();
        let transaction_id = self.transactions.next();
        let envelope = RequestEnvelope::new(transaction_id, owner.map(ToString::to_string), request);
        let body = serde_json::to_vec(&envelope).map_err(TincanError::Encode)?;
        self.transmit(command, transaction_id, &body)?;
        Ok(transaction_id)
    }

    fn transmit(&self, command: &str, transaction_id: u64, body: &[u8]) -> Result<(), TincanError> {
        debug!(
            command,
            transaction_id,
            body = %String::from_utf8_lossy(body),
            "Tincan request"
        );
        self.channel.send(body)
    }

    /// `DO_CREATE_LINK`: connect a tunnel using the peer's CAS.
    pub fn create_link(&self, initiator: &ModuleName, req: &LinkRequest) -> Result<u64, TincanError> {
        info!(peer = req.uid.as_deref().unwrap_or_default(), "Creating connection to peer");
        self.send(
            None,
            TincanRequest::ConnectTunnel(TunnelRequest {
                interface_name: req.interface_name.clone(),
                initiator: Some(initiator.to_string()),
                peer_info: PeerInfo {
                    vip4: req.peer.ip4.clone(),
                    uid: req.uid.clone(),
                    mac: req.peer.mac.clone(),
                    cas: req.peer.cas.clone(),
                    fingerprint: req.peer.fpr.clone(),
                },
            }),
        )
    }

    /// `DO_GET_CAS`: create the local tunnel endpoint for a peer.
    pub fn get_cas(&self, initiator: &ModuleName, req: &LinkRequest) -> Result<u64, TincanError> {
        self.send(
            None,
            TincanRequest::CreateTunnel(TunnelRequest {
                interface_name: req.interface_name.clone(),
                initiator: Some(initiator.to_string()),
                peer_info: PeerInfo {
                    vip4: req.peer.ip4.clone(),
                    uid: req.uid.clone(),
                    mac: req.peer.mac.clone(),
                    cas: None,
                    fingerprint: req.peer.fpr.clone(),
                },
            }),
        )
    }

    /// `DO_TRIM_LINK`
    pub fn trim_link(&self, initiator: &ModuleName, query: &LinkQuery) -> Result<u64, TincanError> {
        info!(peer = query.uid.as_deref().unwrap_or_default(), "Removing connection to peer");
        self.send(
            None,
            TincanRequest::RemovePeer(RemovePeer {
                interface_name: query.interface_name.clone(),
                initiator: Some(initiator.to_string()),
                mac: query.mac.clone(),
            }),
        )
    }

    /// `DO_GET_STATE`
    pub fn get_state(&self, initiator: &ModuleName, query: &LinkQuery) -> Result<u64, TincanError> {
        self.send(None, TincanRequest::QueryNodeInfo(node_query(initiator, query)))
    }

    /// `DO_QUERY_LINK_STATS`. The initiator also owns the reply.
    pub fn query_link_stats(
        &self,
        initiator: &ModuleName,
        query: &LinkQuery,
    ) -> Result<u64, TincanError> {
        self.send(
            Some(initiator),
            TincanRequest::QueryLinkStats(node_query(initiator, query)),
        )
    }

    /// `DO_QUERY_ADDRESS_SET`. The initiator also owns the reply.
    pub fn query_address_set(
        &self,
        initiator: &ModuleName,
        query: &LinkQuery,
    ) -> Result<u64, TincanError> {
        self.send(
            Some(initiator),
            TincanRequest::QueryCandidateAddressSet(node_query(initiator, query)),
        )
    }

    /// `DO_ECHO`
    pub fn echo(
        &self,
        initiator: &ModuleName,
        interface_name: Option<&str>,
    ) -> Result<u64, TincanError> {
        self.send(
            None,
            TincanRequest::EchoRequest(EchoRequest {
                interface_name: interface_name.map(str::to_owned),
                initiator: Some(initiator.to_string()),
            }),
        )
    }

    /// `DO_SEND_ICC_MSG`: the message travels as JSON text.
    pub fn send_icc(&self, initiator: &ModuleName, req: &IccRequest) -> Result<u64, TincanError> {
        let data = serde_json::to_string(&req.msg).map_err(TincanError::Encode)?;
        self.send(
            None,
            TincanRequest::SendIcc(SendIcc {
                interface_name: req.interface_name.clone(),
                initiator: Some(initiator.to_string()),
                recipient: req.dst_uid.clone(),
                recipient_mac: req.dst_mac.clone(),
                data,
            }),
        )
    }

    /// `DO_INSERT_DATA_PACKET`
    pub fn insert_data_packet(&self, packet: &DataPacket) -> Result<u64, TincanError> {
        self.send(
            None,
            TincanRequest::InjectFrame(InjectFrame {
                interface_name: packet.interface_name.clone(),
                data: packet.dataframe.clone(),
            }),
        )
    }

    /// `DO_INSERT_FORWARDING_RULES`: one datagram per destination MAC,
    /// skipping the broadcast MAC and the source MAC itself.
    ///
    /// Returns the transaction ids used, in destination order.
    pub fn insert_forwarding_rules(&self, rules: &ForwardingRules) -> Result<Vec<u64>, TincanError> {
        rules
            .dest_macs
            .iter()
            .filter(|mac| mac.as_str() != BROADCAST_MAC && **mac != rules.source_mac)
            .map(|mac| {
                self.send(
                    None,
                    TincanRequest::AddRoutes(RouteUpdate {
                        interface_name: rules.interface_name.clone(),
                        routes: vec![format!("{mac}:{}", rules.source_mac)],
                    }),
                )
            })
            .collect()
    }

    /// `DO_REMOVE_FORWARDING_RULES`
    pub fn remove_forwarding_rules(&self, rule: &ForwardingRuleRemoval) -> Result<u64, TincanError> {
        self.send(
            None,
            TincanRequest::RemoveRoutes(RouteUpdate {
                interface_name: rule.interface_name.clone(),
                routes: vec![rule.mac.clone()],
            }),
        )
    }

    /// `DO_SEND_TINCAN_MSG`: forward a caller-built envelope after stamping
    /// `IPOP.TransactionId` and `IPOP.Request.Initiator`.
    ///
    /// An envelope without an `IPOP.Request` object is rejected without
    /// consuming a transaction id.
    pub fn send_raw(&self, initiator: &ModuleName, mut message: Value) -> Result<u64, TincanError> {
        let ipop = message
            .get_mut("IPOP")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| TincanError::Malformed("missing IPOP object".into()))?;
        let command = match ipop.get("Request") {
            Some(Value::Object(request)) => request
                .get("Command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            _ => return Err(TincanError::Malformed("missing IPOP.Request object".into())),
        };

        let transaction_id = self.transactions.next();
        ipop.insert("TransactionId".into(), transaction_id.into());
        if let Some(Value::Object(request)) = ipop.get_mut("Request") {
            request.insert("Initiator".into(), Value::String(initiator.to_string()));
        }

        let body = serde_json::to_vec(&message).map_err(TincanError::Encode)?;
        self.transmit(&command, transaction_id, &body)?;
        Ok(transaction_id)
    }

    /// Startup: tell the engine where to send replies.
    pub fn create_ctrl_resp_link(&self, endpoint: &CtrlEndpoint) -> Result<u64, TincanError> {
        info!(ip = %endpoint.ip, port = endpoint.port, "Creating Tincan control response link");
        self.send(
            None,
            TincanRequest::CreateCtrlRespLink(CtrlRespLink {
                address_family: endpoint.family(),
                protocol: PROTO_DATAGRAM.to_string(),
                ip: endpoint.ip.to_string(),
                port: endpoint.port,
            }),
        )
    }

    /// Startup: push the engine's logging parameters.
    pub fn configure_logging(&self, logging: &EngineLogging) -> Result<u64, TincanError> {
        info!(level = %logging.level, "Setting Tincan log level");
        self.send(
            None,
            TincanRequest::ConfigureLogging(ConfigureLogging {
                level: logging.level.clone(),
                device: logging.device.clone(),
                directory: logging.directory.clone(),
                filename: logging.filename.clone(),
                max_archives: logging.max_archives,
                max_file_size: logging.max_file_size,
                console_level: logging.console_level.clone(),
            }),
        )
    }

    /// Startup: create one overlay. Uses the first STUN and TURN entries.
    pub fn create_vnet(
        &self,
        vnet: &VnetConfig,
        stun: &[String],
        turn: Option<&TurnConfig>,
    ) -> Result<u64, TincanError> {
        info!(interface = %vnet.tap_name, "Creating Vnet");
        self.send(
            None,
            TincanRequest::CreateVnet(CreateVnet {
                interface_name: vnet.tap_name.clone(),
                description: vnet.description.clone(),
                local_virt_ip4: vnet.ip4.clone(),
                local_prefix4: vnet.ip4_prefix_len,
                mtu4: vnet.mtu4,
                local_uid: vnet.local_uid(),
                stun_address: stun.first().cloned().unwrap_or_default(),
                turn_address: turn.and_then(|t| t.address.clone()),
                turn_user: turn.and_then(|t| t.user.clone()),
                turn_pass: turn.and_then(|t| t.password.clone()),
                ip_mapping_enabled: vnet.ip_mapping_enabled,
                l2_tunnel_enabled: true,
            }),
        )
    }

    /// Startup: send the overlay's ignore list, if it has one.
    pub fn set_ignored_interfaces(&self, vnet: &VnetConfig) -> Result<Option<u64>, TincanError> {
        let Some(ignored) = &vnet.ignored_net_interfaces else {
            return Ok(None);
        };
        info!(interface = %vnet.tap_name, ignored = ?ignored, "Ignoring interfaces");
        self.send(
            None,
            TincanRequest::SetIgnoredNetInterfaces(IgnoredInterfaces {
                interface_name: vnet.tap_name.clone(),
                ignored_net_interfaces: ignored.clone(),
            }),
        )
        .map(Some)
    }
}

fn node_query(initiator: &ModuleName, query: &LinkQuery) -> NodeQuery {
    NodeQuery {
        protocol_version: PROTOCOL_VERSION,
        interface_name: query.interface_name.clone(),
        uid: query.uid.clone(),
        mac: query.mac.clone(),
        initiator: Some(initiator.to_string()),
    }
}
