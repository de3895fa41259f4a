//! # TincanInterface Module
//!
//! Wires the client, listener and classifier into a controller module.
//! Command CBTs become engine requests; `PROCESS_TINCAN_DATA` CBTs raised by
//! the listener go through the classifier.

use super::client::TincanClient;
use super::dispatcher::ResponseDispatcher;
use crate::adapters::{ControlSockets, TincanListener};
use crate::domain::{CtrlEndpoint, EngineLogging, TincanConfig, TincanError, TransactionCounter};
use crate::ports::ControlChannel;
use async_trait::async_trait;
use cbt_bus::{
    modules, Cbt, CbtPayload, CbtRegistry, ControllerModule, ModuleContext, ModuleError,
    ModuleName,
};
use parking_lot::Mutex;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct TincanInterface {
    name: ModuleName,
    config: TincanConfig,
    logging: EngineLogging,
    client: TincanClient,
    dispatcher: ResponseDispatcher,
    endpoint: CtrlEndpoint,
    listener_socket: Mutex<Option<StdUdpSocket>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl TincanInterface {
    /// Build the module around an existing control channel.
    ///
    /// Without `with_listener` no reply socket is read; useful when replies
    /// are fed in as `PROCESS_TINCAN_DATA` CBTs directly.
    #[must_use]
    pub fn new(
        registry: Arc<CbtRegistry>,
        config: TincanConfig,
        logging: EngineLogging,
        channel: Arc<dyn ControlChannel>,
        endpoint: CtrlEndpoint,
    ) -> Self {
        let name = ModuleName::from(modules::TINCAN_INTERFACE);
        Self {
            client: TincanClient::new(channel, Arc::new(TransactionCounter::new())),
            dispatcher: ResponseDispatcher::new(name.clone(), registry),
            name,
            config,
            logging,
            endpoint,
            listener_socket: Mutex::new(None),
            listener_task: Mutex::new(None),
        }
    }

    /// Attach the reply socket the listener reads once initialized.
    #[must_use]
    pub fn with_listener(self, socket: StdUdpSocket) -> Self {
        *self.listener_socket.lock() = Some(socket);
        self
    }

    /// Bind loopback control sockets and build the module.
    ///
    /// # Errors
    ///
    /// Returns `TincanError::Bind` if the sockets cannot be bound.
    pub fn bind(
        registry: Arc<CbtRegistry>,
        config: TincanConfig,
        logging: EngineLogging,
    ) -> Result<Self, TincanError> {
        let sockets = ControlSockets::bind(&config)?;
        Ok(Self::new(
            registry,
            config,
            logging,
            Arc::new(sockets.channel),
            sockets.endpoint,
        )
        .with_listener(sockets.listener))
    }

    #[must_use]
    pub fn client(&self) -> &TincanClient {
        &self.client
    }

    #[must_use]
    pub fn endpoint(&self) -> CtrlEndpoint {
        self.endpoint
    }

    /// Reverse link, engine logging, then each overlay and its ignore list.
    fn configure_engine(&self) {
        report("CreateCtrlRespLink", self.client.create_ctrl_resp_link(&self.endpoint));
        report("ConfigureLogging", self.client.configure_logging(&self.logging));

        let turn = self.config.turn.first();
        for vnet in &self.config.vnets {
            report("CreateVnet", self.client.create_vnet(vnet, &self.config.stun, turn));
        }
        for vnet in &self.config.vnets {
            report(
                "SetIgnoredNetInterfaces",
                self.client.set_ignored_interfaces(vnet),
            );
        }
    }

    /// Act on one payload. `None` means the payload is not one this module
    /// consumes.
    fn handle(&self, initiator: &ModuleName, data: CbtPayload) -> Option<Result<(), TincanError>> {
        let result = match data {
            CbtPayload::CreateLink(req) => self.client.create_link(initiator, &req).map(drop),
            CbtPayload::TrimLink(query) => self.client.trim_link(initiator, &query).map(drop),
            CbtPayload::GetState(query) => self.client.get_state(initiator, &query).map(drop),
            CbtPayload::GetCas(req) => self.client.get_cas(initiator, &req).map(drop),
            CbtPayload::Echo { interface_name } => self
                .client
                .echo(initiator, interface_name.as_deref())
                .map(drop),
            CbtPayload::SendIccMsg(req) => self.client.send_icc(initiator, &req).map(drop),
            CbtPayload::InsertDataPacket(packet) => {
                self.client.insert_data_packet(&packet).map(drop)
            }
            CbtPayload::InsertForwardingRules(rules) => {
                self.client.insert_forwarding_rules(&rules).map(drop)
            }
            CbtPayload::RemoveForwardingRules(rule) => {
                self.client.remove_forwarding_rules(&rule).map(drop)
            }
            CbtPayload::SendTincanMsg(message) => self.client.send_raw(initiator, message).map(drop),
            CbtPayload::QueryLinkStats(query) => {
                self.client.query_link_stats(initiator, &query).map(drop)
            }
            CbtPayload::QueryAddressSet(query) => {
                self.client.query_address_set(initiator, &query).map(drop)
            }
            CbtPayload::ProcessTincanData(datagram) => {
                self.dispatcher.dispatch(&datagram);
                Ok(())
            }
            CbtPayload::TincanResponse(_)
            | CbtPayload::SendCasDetailsToPeer(_)
            | CbtPayload::ArpPacket(_)
            | CbtPayload::PeerMacIpDetails(_)
            | CbtPayload::BroadcastPkt(_)
            | CbtPayload::BroadcastData(_)
            | CbtPayload::IccControl(_)
            | CbtPayload::TincanPacket(_) => return None,
        };
        Some(result)
    }
}

fn report<T>(step: &str, result: Result<T, TincanError>) {
    if let Err(e) = result {
        warn!(step, error = %e, "Tincan startup request failed");
    }
}

#[async_trait]
impl ControllerModule for TincanInterface {
    fn name(&self) -> &ModuleName {
        &self.name
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        let socket = self.listener_socket.lock().take();
        if let Some(socket) = socket {
            let listener = TincanListener::new(
                socket,
                ctx.registry.clone(),
                self.name.clone(),
                self.config.buf_size,
                self.config.socket_read_wait(),
            )
            .map_err(|e| ModuleError::Initialization {
                module: self.name.clone(),
                message: e.to_string(),
            })?;
            let handle = tokio::spawn(listener.run(ctx.shutdown.clone()));
            *self.listener_task.lock() = Some(handle);
        }

        self.configure_engine();
        info!(module = %self.name, "{} loaded", self.name);
        Ok(())
    }

    async fn process_cbt(&self, cbt: Cbt) {
        let Cbt {
            initiator,
            recipient,
            action,
            data,
            ..
        } = cbt;

        match self.handle(&initiator, data) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(action = %action, initiator = %initiator, error = %e, "Tincan request failed");
            }
            None => warn!(
                recipient = %recipient,
                action = %action,
                initiator = %initiator,
                "Unrecognized CBT"
            ),
        }
    }

    async fn terminate(&self) -> Result<(), ModuleError> {
        let task = self.listener_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        debug!(module = %self.name, "Tincan interface terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingChannel;
    use crate::domain::{TurnConfig, VnetConfig};
    use cbt_bus::{ForwardingRules, LinkRequest, PeerDescriptor};
    use serde_json::json;
    use std::net::{IpAddr, Ipv6Addr};
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::timeout;

    fn vnet(tap: &str, ip4: &str, ignored: Option<Vec<String>>) -> VnetConfig {
        VnetConfig {
            tap_name: tap.into(),
            description: String::new(),
            ip4: ip4.into(),
            ip4_prefix_len: 16,
            mtu4: None,
            ip_mapping_enabled: None,
            ignored_net_interfaces: ignored,
        }
    }

    fn setup(config: TincanConfig) -> (TincanInterface, Arc<RecordingChannel>, Arc<CbtRegistry>) {
        let registry = Arc::new(CbtRegistry::new());
        let channel = Arc::new(RecordingChannel::new());
        let module = TincanInterface::new(
            registry.clone(),
            config,
            EngineLogging::default(),
            channel.clone(),
            CtrlEndpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 5801),
        );
        (module, channel, registry)
    }

    fn context(registry: &Arc<CbtRegistry>) -> (ModuleContext, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (ModuleContext::new(registry.clone(), rx), tx)
    }

    #[tokio::test]
    async fn test_startup_sequence_order() {
        let config = TincanConfig {
            stun: vec!["stun.l.google.com:19302".into()],
            turn: vec![TurnConfig::default()],
            vnets: vec![
                vnet("ipop_tap0", "10.254.0.1", Some(vec!["docker0".into()])),
                vnet("ipop_tap1", "10.253.0.1", None),
            ],
            ..TincanConfig::default()
        };
        let (module, channel, registry) = setup(config);
        let (ctx, _tx) = context(&registry);

        module.initialize(&ctx).await.unwrap();

        assert_eq!(
            channel.commands(),
            vec![
                "CreateCtrlRespLink",
                "ConfigureLogging",
                "CreateVnet",
                "CreateVnet",
                "SetIgnoredNetInterfaces",
            ]
        );
        let envs = channel.envelopes();
        for (i, env) in envs.iter().enumerate() {
            assert_eq!(env["IPOP"]["TransactionId"], json!(i));
        }
        assert_eq!(envs[0]["IPOP"]["Request"]["AddressFamily"], "af_inetv6");
        assert_eq!(envs[0]["IPOP"]["Request"]["IP"], "::1");
        assert_eq!(envs[4]["IPOP"]["Request"]["InterfaceName"], "ipop_tap0");
    }

    #[tokio::test]
    async fn test_startup_survives_transport_failure() {
        let (module, channel, registry) = setup(TincanConfig::default());
        let (ctx, _tx) = context(&registry);
        channel.set_failing(true);
        assert!(module.initialize(&ctx).await.is_ok());
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_create_link_cbt() {
        let (module, channel, _registry) = setup(TincanConfig::default());
        let cbt = Cbt::new(
            modules::LINK_MANAGER,
            modules::TINCAN_INTERFACE,
            CbtPayload::CreateLink(LinkRequest {
                interface_name: Some("ipop_tap0".into()),
                uid: Some("7bfb6d022d".into()),
                peer: PeerDescriptor::default(),
            }),
        );
        module.process_cbt(cbt).await;

        let env = &channel.envelopes()[0];
        assert_eq!(env["IPOP"]["Request"]["Command"], "ConnectTunnel");
        assert_eq!(env["IPOP"]["Request"]["Initiator"], "LinkManager");
    }

    #[tokio::test]
    async fn test_forwarding_rules_cbt() {
        let (module, channel, _registry) = setup(TincanConfig::default());
        let cbt = Cbt::new(
            modules::BROADCAST_FORWARDER,
            modules::TINCAN_INTERFACE,
            CbtPayload::InsertForwardingRules(ForwardingRules {
                interface_name: Some("ipop_tap0".into()),
                source_mac: "aa11aa11aa11".into(),
                dest_macs: vec![
                    "000000000000".into(),
                    "bb22bb22bb22".into(),
                    "aa11aa11aa11".into(),
                ],
            }),
        );
        module.process_cbt(cbt).await;
        assert_eq!(channel.commands(), vec!["AddRoutes"]);
    }

    #[tokio::test]
    async fn test_process_tincan_data_emits_event() {
        let (module, _channel, registry) = setup(TincanConfig::default());
        let mut arp = registry.register_module(modules::ARP_CACHE);

        let datagram = json!({"IPOP": {"Request": {
            "Command": "UpdateRoutes",
            "InterfaceName": "ipop_tap0",
            "Data": "ffffffffffff0a1b2c3d4e5f08060001"
        }}});
        let cbt = Cbt::new(
            modules::TINCAN_INTERFACE,
            modules::TINCAN_INTERFACE,
            CbtPayload::ProcessTincanData(datagram.to_string().into_bytes()),
        );
        module.process_cbt(cbt).await;

        let event = timeout(Duration::from_millis(100), arp.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(event.action, "ARPPacket");
        assert_eq!(event.initiator, "TincanInterface");
    }

    #[tokio::test]
    async fn test_unrecognized_cbt_sends_nothing() {
        let (module, channel, _registry) = setup(TincanConfig::default());
        let cbt = Cbt::new(
            modules::LINK_MANAGER,
            modules::TINCAN_INTERFACE,
            CbtPayload::TincanResponse(cbt_bus::TincanResponse::SetGeoIp {
                interface_name: "ipop_tap0".into(),
                cas: "stun".into(),
            }),
        );
        module.process_cbt(cbt).await;
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_is_not_fatal() {
        let (module, channel, _registry) = setup(TincanConfig::default());
        channel.set_failing(true);
        module
            .process_cbt(Cbt::new(
                modules::LINK_MANAGER,
                modules::TINCAN_INTERFACE,
                CbtPayload::Echo { interface_name: None },
            ))
            .await;
        channel.set_failing(false);
        module
            .process_cbt(Cbt::new(
                modules::LINK_MANAGER,
                modules::TINCAN_INTERFACE,
                CbtPayload::Echo { interface_name: None },
            ))
            .await;
        // The failed datagram still consumed id 0.
        assert_eq!(channel.envelopes()[0]["IPOP"]["TransactionId"], 1);
    }
}
