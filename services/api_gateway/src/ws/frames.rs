use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the server sends to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Hello { connection_id: String, heartbeat_sec: u64 },
    Pong,
    Event {
        event: String,
        status: String,
        payload: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tick: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        state_version: Option<u64>,
    },
    Error { code: String, message: String, #[serde(skip_serializing_if = "Option::is_none")] details: Option<Value> },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","code":"common.internal_error","message":"serialize failed"}"#.to_string())
    }
}

/// Frames a client may send. `Command`/`Subscribe`/
/// `Unsubscribe` bodies are not further specified by this surface; they are
/// accepted and passed through for higher-level consumers to interpret.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Command {
        #[serde(flatten)]
        body: Value,
    },
    Ping,
    Subscribe {
        #[serde(flatten)]
        body: Value,
    },
    Unsubscribe {
        #[serde(flatten)]
        body: Value,
    },
}

/// Raw shape of a message pulled off the outbound queue. The recipient
/// selector carries at least a connection id and/or account id.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundMessage {
    pub connection_id: Option<String>,
    pub account_id: Option<i64>,
    pub status: String,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    pub event: Option<String>,
    pub payload: Value,
    pub request_id: Option<String>,
    pub tick: Option<u64>,
    pub state_version: Option<u64>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: Option<Value>,
}

impl OutboundMessage {
    /// Maps backend status to the wire frame: `error` renders an `Error`
    /// frame; everything else renders an `Event` frame with status
    /// `ok|update`, overridden to `final` when the backend sets `final: true`
    /// regardless of what `status` itself says.
    pub fn into_frame(self) -> ServerFrame {
        if self.status == "error" {
            return ServerFrame::Error {
                code: self.error_code.unwrap_or_else(|| "common.internal_error".to_string()),
                message: self.message.unwrap_or_default(),
                details: self.details,
            };
        }

        let status = if self.is_final {
            "final"
        } else {
            match self.status.as_str() {
                "update" => "update",
                _ => "ok",
            }
        };

        ServerFrame::Event {
            event: self.event.unwrap_or_default(),
            status: status.to_string(),
            payload: self.payload,
            request_id: self.request_id,
            tick: self.tick,
            state_version: self.state_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_renders_error_frame() {
        let msg = OutboundMessage {
            connection_id: Some("ws_1_abcd1234".into()),
            account_id: None,
            status: "error".into(),
            is_final: false,
            event: None,
            payload: Value::Null,
            request_id: None,
            tick: None,
            state_version: None,
            error_code: Some("common.internal_error".into()),
            message: Some("boom".into()),
            details: None,
        };
        let frame = msg.into_frame();
        match frame {
            ServerFrame::Error { code, message, .. } => {
                assert_eq!(code, "common.internal_error");
                assert_eq!(message, "boom");
            }
            _ => panic!("expected error frame"),
        }
    }

    #[test]
    fn ok_status_renders_event_frame() {
        let msg = OutboundMessage {
            connection_id: Some("ws_1_abcd1234".into()),
            account_id: None,
            status: "ok".into(),
            is_final: false,
            event: Some("match.found".into()),
            payload: serde_json::json!({"a": 1}),
            request_id: Some("r1".into()),
            tick: None,
            state_version: None,
            error_code: None,
            message: None,
            details: None,
        };
        match msg.into_frame() {
            ServerFrame::Event { event, status, .. } => {
                assert_eq!(event, "match.found");
                assert_eq!(status, "ok");
            }
            _ => panic!("expected event frame"),
        }
    }

    #[test]
    fn final_flag_overrides_status() {
        let msg = OutboundMessage {
            connection_id: Some("ws_1_abcd1234".into()),
            account_id: None,
            status: "update".into(),
            is_final: true,
            event: Some("match.ended".into()),
            payload: Value::Null,
            request_id: None,
            tick: None,
            state_version: None,
            error_code: None,
            message: None,
            details: None,
        };
        match msg.into_frame() {
            ServerFrame::Event { status, .. } => assert_eq!(status, "final"),
            _ => panic!("expected event frame"),
        }
    }

    #[test]
    fn outbound_message_deserializes_final_keyword_field() {
        let raw = serde_json::json!({
            "connection_id": "ws_1_abcd1234",
            "status": "ok",
            "final": true,
            "payload": {}
        });
        let msg: OutboundMessage = serde_json::from_value(raw).unwrap();
        assert!(msg.is_final);
    }

    #[test]
    fn hello_frame_serializes_with_tagged_type() {
        let frame = ServerFrame::Hello { connection_id: "ws_1_abcd1234".into(), heartbeat_sec: 20 };
        let json = frame.to_json();
        assert!(json.contains("\"type\":\"hello\""));
        assert!(json.contains("ws_1_abcd1234"));
    }
}
