use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// The uniform RPC response shape that crosses the wire on every reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub correlation_id: String,
}

impl<T> RpcEnvelope<T> {
    pub fn ok(data: T, correlation_id: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_code: None,
            message: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn err(code: ErrorCode, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_code: Some(code.as_str().to_string()),
            message: Some(message.into()),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Metadata lifted off a broker delivery, independent of its JSON body.
#[derive(Debug, Clone, Default)]
pub struct DeliveryMeta {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub routing_key: String,
    pub retry_count: u64,
}
