use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credentials {
    pub account_id: i64,
    pub password_hash: String,
    pub password_updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// An account joined with its one-to-one credentials row, the shape the
/// login hot path actually needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountWithCredentials {
    #[sqlx(flatten)]
    pub account: Account,
    #[sqlx(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub account_id: i64,
    pub jti: Uuid,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

// ---- RPC request DTOs (flat JSON payloads) ----

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueTokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenRequest {
    pub access_token: String,
}

// ---- RPC response payloads ----

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub account_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPairResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub account_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl ValidateTokenResponse {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            account_id: None,
            client_id: None,
            scopes: Vec::new(),
            exp: None,
        }
    }
}
