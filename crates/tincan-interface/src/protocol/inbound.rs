//! # Inbound Envelope
//!
//! Replies carry the echoed `Request` plus a `Response`; unsolicited
//! notifications (`ICC`, `UpdateRoutes`) carry `Request` only.

use crate::domain::TincanError;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "IPOP")]
    pub ipop: InboundBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundBody {
    #[serde(default)]
    pub transaction_id: Option<u64>,
    pub request: Map<String, Value>,
    #[serde(default)]
    pub response: Option<ResponseStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseStatus {
    pub success: bool,
    /// JSON text, a JSON object or a plain string depending on the command.
    #[serde(default)]
    pub message: Value,
}

impl InboundEnvelope {
    /// Parse one datagram.
    pub fn parse(datagram: &[u8]) -> Result<Self, TincanError> {
        serde_json::from_slice(datagram).map_err(TincanError::Decode)
    }

    /// `Request.Command`.
    pub fn command(&self) -> Result<&str, TincanError> {
        self.request_str("Command")
            .ok_or(TincanError::MissingField("Request.Command"))
    }

    /// `Request.InterfaceName`, or empty when absent.
    #[must_use]
    pub fn interface_name(&self) -> &str {
        self.request_str("InterfaceName").unwrap_or_default()
    }

    /// `Request.Initiator`, the module the reply is routed to.
    pub fn initiator(&self) -> Result<&str, TincanError> {
        self.request_str("Initiator")
            .ok_or(TincanError::MissingField("Request.Initiator"))
    }

    #[must_use]
    pub fn request_str(&self, key: &str) -> Option<&str> {
        self.ipop.request.get(key).and_then(Value::as_str)
    }

    /// A string field of `Request.PeerInfo`, or empty when absent.
    #[must_use]
    pub fn peer_info_str(&self, key: &str) -> &str {
        self.ipop
            .request
            .get("PeerInfo")
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn response(&self) -> Option<&ResponseStatus> {
        self.ipop.response.as_ref()
    }
}

impl ResponseStatus {
    /// The message as an object, decoding JSON text when needed.
    pub fn message_object(&self) -> Result<Map<String, Value>, TincanError> {
        match embedded_json(&self.message)? {
            Value::Object(map) => Ok(map),
            other => Err(TincanError::Malformed(format!(
                "expected object in Response.Message, found {other}"
            ))),
        }
    }

    /// The message as text. Non-string messages are rendered as JSON.
    #[must_use]
    pub fn message_text(&self) -> String {
        value_text(&self.message)
    }
}

/// Decode a value that may hold JSON text or already-structured JSON.
pub fn embedded_json(value: &Value) -> Result<Value, TincanError> {
    match value {
        Value::String(text) => serde_json::from_str(text).map_err(TincanError::Decode),
        other => Ok(other.clone()),
    }
}

/// Render a value as plain text without quoting strings.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> InboundEnvelope {
        InboundEnvelope::parse(v.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_reply_fields() {
        let env = parse(json!({"IPOP": {
            "TransactionId": 5,
            "Request": {"Command": "QueryNodeInfo", "InterfaceName": "ipop_tap0", "Initiator": "LinkManager"},
            "Response": {"Success": true, "Message": "{\"Type\":\"local\"}"}
        }}));
        assert_eq!(env.command().unwrap(), "QueryNodeInfo");
        assert_eq!(env.interface_name(), "ipop_tap0");
        assert_eq!(env.initiator().unwrap(), "LinkManager");
        assert_eq!(env.ipop.transaction_id, Some(5));
        let resp = env.response().unwrap();
        assert!(resp.success);
        assert_eq!(resp.message_object().unwrap()["Type"], "local");
    }

    #[test]
    fn test_notification_has_no_response() {
        let env = parse(json!({"IPOP": {"Request": {"Command": "UpdateRoutes", "Data": "00"}}}));
        assert!(env.response().is_none());
        assert!(env.ipop.transaction_id.is_none());
        assert_eq!(env.interface_name(), "");
    }

    #[test]
    fn test_missing_command() {
        let env = parse(json!({"IPOP": {"Request": {}}}));
        assert!(matches!(env.command(), Err(TincanError::MissingField(_))));
    }

    #[test]
    fn test_bad_json_is_decode_error() {
        let result = InboundEnvelope::parse(b"{not json");
        assert!(matches!(result, Err(TincanError::Decode(_))));
    }

    #[test]
    fn test_missing_ipop_is_decode_error() {
        let result = InboundEnvelope::parse(br#"{"Other": {}}"#);
        assert!(matches!(result, Err(TincanError::Decode(_))));
    }

    #[test]
    fn test_message_object_accepts_object_or_text() {
        let obj = ResponseStatus { success: true, message: json!({"Controlled": "x"}) };
        let text = ResponseStatus { success: true, message: json!("{\"Controlled\": \"x\"}") };
        assert_eq!(obj.message_object().unwrap(), text.message_object().unwrap());

        let plain = ResponseStatus { success: true, message: json!("udp:1.2.3.4:5000") };
        assert!(plain.message_object().is_err());
        assert_eq!(plain.message_text(), "udp:1.2.3.4:5000");
    }
}
