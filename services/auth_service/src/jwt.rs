use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AuthError;

const ACCESS_AUD: &str = "access";
const REFRESH_AUD: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

/// Issues and verifies HS256 JWTs with the algorithm explicitly pinned
/// (never trusting the token header) and mandatory audience checks.
/// `aud="access"` for access tokens, `aud="refresh"` for refresh tokens —
/// an access token can never be replayed where a refresh token is expected,
/// or vice versa. `aud_base`, when configured, namespaces both audiences
/// (`"<aud_base>:access"`/`"<aud_base>:refresh"`) so tokens minted by one
/// deployment can't be replayed against another sharing the same secret.
pub struct JwtManager {
    secret: String,
    issuer: String,
    aud_base: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>, aud_base: impl Into<String>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            aud_base: aud_base.into(),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    fn access_aud(&self) -> String {
        if self.aud_base.is_empty() {
            ACCESS_AUD.to_string()
        } else {
            format!("{}:{ACCESS_AUD}", self.aud_base)
        }
    }

    fn refresh_aud(&self) -> String {
        if self.aud_base.is_empty() {
            REFRESH_AUD.to_string()
        } else {
            format!("{}:{REFRESH_AUD}", self.aud_base)
        }
    }

    pub fn issue_access_token(&self, account_id: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.access_aud(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Returns `(refresh_jwt, jti)`. Only the JWT's SHA-256 hash is ever
    /// persisted by the caller — the JWT text itself is never stored.
    pub fn issue_refresh_token(&self, account_id: i64) -> Result<(String, Uuid), AuthError> {
        let now = Utc::now();
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.refresh_aud(),
            jti: jti.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok((token, jti))
    }

    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.set_audience(&[self.access_aud()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<AccessClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(classify_jwt_error)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.set_audience(&[self.refresh_aud()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<RefreshClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::RefreshInvalid)
    }

    /// Used only by the `Validate` RPC: accepts either the access or the
    /// refresh audience, since a caller checking "is this token still good"
    /// doesn't know in advance which kind it's holding.
    pub fn decode_token_for_validate(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.set_audience(&[self.access_aud(), self.refresh_aud()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<AccessClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(classify_jwt_error)
    }
}

fn classify_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret-at-least-this-long", "auth_service", "", 1800, 1_209_600)
    }

    #[test]
    fn access_token_round_trips() {
        let mgr = manager();
        let token = mgr.issue_access_token(42).unwrap();
        let claims = mgr.decode_access_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.aud, "access");
        assert_eq!(claims.iss, "auth_service");
    }

    #[test]
    fn refresh_token_carries_jti_and_refresh_audience() {
        let mgr = manager();
        let (token, jti) = mgr.issue_refresh_token(7).unwrap();
        let claims = mgr.decode_refresh_token(&token).unwrap();
        assert_eq!(claims.jti, jti.to_string());
        assert_eq!(claims.aud, "refresh");
    }

    #[test]
    fn access_token_rejected_as_refresh_token() {
        let mgr = manager();
        let token = mgr.issue_access_token(1).unwrap();
        assert!(matches!(mgr.decode_refresh_token(&token), Err(AuthError::RefreshInvalid)));
    }

    #[test]
    fn refresh_token_rejected_as_access_token() {
        let mgr = manager();
        let (token, _jti) = mgr.issue_refresh_token(1).unwrap();
        assert!(mgr.decode_access_token(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let mgr = manager();
        let mut token = mgr.issue_access_token(1).unwrap();
        token.push('x');
        assert!(matches!(mgr.decode_access_token(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn validate_accepts_either_access_or_refresh_audience() {
        let mgr = manager();
        let access = mgr.issue_access_token(1).unwrap();
        let (refresh, _jti) = mgr.issue_refresh_token(1).unwrap();

        assert!(mgr.decode_token_for_validate(&access).is_ok());
        assert!(mgr.decode_token_for_validate(&refresh).is_ok());
    }

    #[test]
    fn configured_audience_base_namespaces_both_token_kinds() {
        let mgr = JwtManager::new("test-secret-at-least-this-long", "auth_service", "tenant-a", 1800, 1_209_600);
        let token = mgr.issue_access_token(1).unwrap();
        let claims = mgr.decode_access_token(&token).unwrap();
        assert_eq!(claims.aud, "tenant-a:access");
    }
}
