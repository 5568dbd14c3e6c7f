use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus did not become available within the connect deadline: {0}")]
    BusUnavailable(String),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to serialize message body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("rpc call timed out after {0:?}")]
    RpcTimeout(std::time::Duration),

    #[error("rpc reply channel closed before a response arrived")]
    RpcChannelClosed,

    #[error("rpc reply was malformed or empty")]
    BadResponse,
}

/// Stable wire error codes from the cross-service error taxonomy.
///
/// These are distinct from [`BusError`]: they cross process boundaries in
/// RPC response envelopes, while `BusError` stays local to one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AuthInvalidCredentials,
    AuthTokenExpired,
    AuthInvalidToken,
    AuthUserExists,
    AuthForbidden,
    AuthRefreshInvalid,
    RpcTimeout,
    RpcBadResponse,
    ValidationFailed,
    CommonNotImplemented,
    CommonInternalError,
}

impl ErrorCode {
    /// True for codes that represent an infrastructure failure (DB/Redis/bus
    /// hiccup) rather than a recognized business outcome. [`RpcHandlerAdapter`]
    /// uses this to decide whether to reply immediately with an error
    /// envelope or let the delivery fall through to the broker's
    /// retry/DLQ cycle instead.
    ///
    /// [`RpcHandlerAdapter`]: crate::rpc_handler::RpcHandlerAdapter
    pub const fn is_infra(self) -> bool {
        matches!(self, ErrorCode::CommonInternalError)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AuthInvalidCredentials => "auth.invalid_credentials",
            ErrorCode::AuthTokenExpired => "auth.token_expired",
            ErrorCode::AuthInvalidToken => "auth.invalid_token",
            ErrorCode::AuthUserExists => "auth.user_exists",
            ErrorCode::AuthForbidden => "auth.forbidden",
            ErrorCode::AuthRefreshInvalid => "auth.refresh_invalid",
            ErrorCode::RpcTimeout => "rpc.timeout",
            ErrorCode::RpcBadResponse => "rpc.bad_response",
            ErrorCode::ValidationFailed => "validation.failed",
            ErrorCode::CommonNotImplemented => "common.not_implemented",
            ErrorCode::CommonInternalError => "common.internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
