// Wire messages exchanged with the child
//
// Framing: one JSON value per line, terminated by a single '\n'.
// Response ids are NOT correlated with request ids.

use super::error::{MessageError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request identifier (number or string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// Outbound message written to the child's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestMessage {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: None,
        }
    }

    /// A message without an id; the peer must not answer it
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Encode as a single newline-terminated line
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self).map_err(|e| MessageError::Encode {
            method: self.method.clone(),
            reason: e.to_string(),
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Rough shape of a decoded payload (no schema validation)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
    Error,
    Batch,
    Other,
}

impl MessageKind {
    pub fn of(payload: &Value) -> Self {
        let Some(obj) = payload.as_object() else {
            return if payload.is_array() {
                MessageKind::Batch
            } else {
                MessageKind::Other
            };
        };

        match (obj.contains_key("method"), obj.contains_key("id")) {
            (true, true) => MessageKind::Request,
            (true, false) => MessageKind::Notification,
            _ if obj.contains_key("error") => MessageKind::Error,
            _ if obj.contains_key("result") => MessageKind::Response,
            _ => MessageKind::Other,
        }
    }
}

/// One line captured from the child's stdout
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    pub raw: String,
    /// Present only if the line is a JSON object or array
    pub payload: Option<Value>,
    pub received_at_ms: i64,
}

impl OutputLine {
    /// Attempt structured decoding of a raw line
    ///
    /// Bare JSON scalars (`42`, `"text"`, `null`) are treated as diagnostic
    /// text: a protocol message is always an object or a batch array.
    pub fn decode(raw: impl Into<String>, received_at_ms: i64) -> Self {
        let mut raw = raw.into();
        while raw.ends_with('\n') || raw.ends_with('\r') {
            raw.pop();
        }

        let payload = serde_json::from_str::<Value>(raw.trim())
            .ok()
            .filter(|v| v.is_object() || v.is_array());

        Self {
            raw,
            payload,
            received_at_ms,
        }
    }

    pub fn is_structured(&self) -> bool {
        self.payload.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.payload.as_ref().map(MessageKind::of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_line_framing() {
        let req = RequestMessage::new(2, "tools/list");
        let line = req.to_line().unwrap();

        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n"
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = RequestMessage::notification("notifications/initialized");
        let value: Value = serde_json::from_slice(&note.to_line().unwrap()).unwrap();

        assert!(value.get("id").is_none());
        assert!(value.get("params").is_none());
        assert_eq!(value["method"], "notifications/initialized");
    }

    #[test]
    fn test_string_request_id() {
        let req = RequestMessage::new("abc", "ping").with_params(json!({"x": 1}));
        let value: Value = serde_json::from_slice(&req.to_line().unwrap()).unwrap();

        assert_eq!(value["id"], "abc");
        assert_eq!(value["params"]["x"], 1);
    }

    #[test]
    fn test_parse_request_without_version() {
        let req: RequestMessage =
            serde_json::from_str(r#"{"id": 9, "method": "resources/list"}"#).unwrap();
        assert_eq!(req.jsonrpc, JSONRPC_VERSION);
        assert_eq!(req.id, Some(RequestId::Number(9)));
    }

    #[test]
    fn test_decode_structured_line() {
        let line = OutputLine::decode("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\r\n", 7);

        assert!(line.is_structured());
        assert_eq!(line.raw, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}");
        assert_eq!(line.kind(), Some(MessageKind::Response));
        assert_eq!(line.received_at_ms, 7);
    }

    #[test]
    fn test_decode_diagnostic_text() {
        let line = OutputLine::decode("Starting server on stdio...", 0);
        assert!(!line.is_structured());
        assert_eq!(line.kind(), None);

        // Truncated JSON is not a message
        assert!(!OutputLine::decode("{\"jsonrpc\":\"2.0\"", 0).is_structured());
    }

    #[test]
    fn test_scalars_are_not_messages() {
        assert!(!OutputLine::decode("42", 0).is_structured());
        assert!(!OutputLine::decode("\"hello\"", 0).is_structured());
        assert!(!OutputLine::decode("null", 0).is_structured());
        assert!(OutputLine::decode("[{\"id\":1,\"result\":1}]", 0).is_structured());
    }

    #[test]
    fn test_message_kind_classification() {
        assert_eq!(
            MessageKind::of(&json!({"id": 1, "method": "ping"})),
            MessageKind::Request
        );
        assert_eq!(
            MessageKind::of(&json!({"method": "notifications/progress"})),
            MessageKind::Notification
        );
        assert_eq!(
            MessageKind::of(&json!({"id": 1, "error": {"code": -32601}})),
            MessageKind::Error
        );
        assert_eq!(MessageKind::of(&json!([])), MessageKind::Batch);
        assert_eq!(MessageKind::of(&json!({"hello": 1})), MessageKind::Other);
    }

    #[test]
    fn test_blank_line() {
        assert!(OutputLine::decode("   \n", 0).is_blank());
        assert!(!OutputLine::decode("x", 0).is_blank());
    }
}
