use core_bus::ErrorCode;
use thiserror::Error;

/// Domain errors returned by the auth service. Each variant maps to a
/// stable wire error code via [`AuthError::code`]; the RPC handler adapter
/// uses that to build the response envelope.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("access token expired")]
    TokenExpired,
    #[error("malformed or forged access token")]
    InvalidToken,
    #[error("username or email already registered")]
    UserExists,
    #[error("account temporarily locked out")]
    Forbidden,
    #[error("refresh token unknown, revoked, expired, or hash mismatch")]
    RefreshInvalid,
    #[error("{0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidCredentials => ErrorCode::AuthInvalidCredentials,
            AuthError::TokenExpired => ErrorCode::AuthTokenExpired,
            AuthError::InvalidToken => ErrorCode::AuthInvalidToken,
            AuthError::UserExists => ErrorCode::AuthUserExists,
            AuthError::Forbidden => ErrorCode::AuthForbidden,
            AuthError::RefreshInvalid => ErrorCode::AuthRefreshInvalid,
            AuthError::Validation(_) => ErrorCode::ValidationFailed,
            AuthError::Internal(_) => ErrorCode::CommonInternalError,
        }
    }

    /// `(ErrorCode, message)` as expected by `core_bus::rpc_handler::HandlerResult`.
    pub fn into_rpc(self) -> (ErrorCode, String) {
        let code = self.code();
        (code, self.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Internal(e.to_string())
    }
}
