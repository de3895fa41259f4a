//! # Wire Protocol
//!
//! JSON envelopes exchanged with the tunnel engine, one per UDP datagram.

pub mod envelope;
pub mod inbound;

pub use envelope::{
    ConfigureLogging, CreateVnet, CtrlRespLink, EchoRequest, IgnoredInterfaces, InjectFrame,
    NodeQuery, PeerInfo, RemovePeer, RequestEnvelope, RequestHeader, RouteUpdate, SendIcc,
    TincanRequest, TunnelRequest, BROADCAST_MAC, CONTROL_TYPE_REQUEST, PROTOCOL_VERSION,
    PROTO_DATAGRAM,
};
pub use inbound::{embedded_json, value_text, InboundBody, InboundEnvelope, ResponseStatus};
