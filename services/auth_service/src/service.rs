use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::db::AuthRepository;
use crate::errors::AuthError;
use crate::jwt::JwtManager;
use crate::models::{
    IssueTokenRequest, LogoutRequest, LogoutResponse, RefreshTokenRequest, RegisterRequest,
    RegisterResponse, TokenPairResponse, ValidateTokenRequest, ValidateTokenResponse,
};
use crate::redis_store::LoginRateLimiter;

fn hash_refresh_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Domain logic for registration, login, refresh, logout, and token
/// validation. Handlers call straight into this; it knows nothing about the
/// message bus.
pub struct AuthService {
    repo: Arc<AuthRepository>,
    jwt: Arc<JwtManager>,
    rate_limiter: Arc<LoginRateLimiter>,
}

impl AuthService {
    pub fn new(repo: Arc<AuthRepository>, jwt: Arc<JwtManager>, rate_limiter: Arc<LoginRateLimiter>) -> Self {
        Self { repo, jwt, rate_limiter }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, AuthError> {
        if req.username.trim().is_empty() || req.password.len() < 8 {
            return Err(AuthError::Validation("username required and password must be at least 8 characters".into()));
        }

        if self.repo.find_account_by_username_or_email_ci(&req.username, &req.email).await? {
            return Err(AuthError::UserExists);
        }

        let password = req.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, 12))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let account = self
            .repo
            .insert_account_and_credentials(&req.username, &req.email, &password_hash)
            .await?;

        Ok(RegisterResponse {
            account_id: account.id,
            username: account.username,
        })
    }

    pub async fn issue(&self, req: IssueTokenRequest, user_agent: Option<&str>, ip: Option<&str>) -> Result<TokenPairResponse, AuthError> {
        if self.rate_limiter.is_banned(&req.username).await? {
            return Err(AuthError::Forbidden);
        }

        let record = self.repo.find_account_by_username(&req.username).await?;

        let Some(record) = record else {
            self.rate_limiter.record_failure(&req.username).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let password = req.password.clone();
        let hash = record.credentials.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .unwrap_or(false);

        if !matches {
            self.rate_limiter.record_failure(&req.username).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.rate_limiter.reset(&req.username).await?;
        self.repo.set_last_login(record.account.id, Utc::now()).await?;

        self.mint_token_pair(record.account.id, user_agent, ip).await
    }

    pub async fn refresh(&self, req: RefreshTokenRequest, user_agent: Option<&str>, ip: Option<&str>) -> Result<TokenPairResponse, AuthError> {
        let claims = self.jwt.decode_refresh_token(&req.refresh_token)?;
        let jti = uuid::Uuid::parse_str(&claims.jti).map_err(|_| AuthError::RefreshInvalid)?;

        let Some(stored) = self.repo.find_refresh_token_by_jti(jti).await? else {
            return Err(AuthError::RefreshInvalid);
        };

        if !stored.is_active(Utc::now()) {
            return Err(AuthError::RefreshInvalid);
        }

        if stored.token_hash != hash_refresh_token(&req.refresh_token) {
            return Err(AuthError::RefreshInvalid);
        }

        // Rotate: revoke the old refresh token before minting a replacement,
        // so a stolen-and-replayed old token can never mint twice.
        self.repo.revoke_refresh_token(stored.id, Utc::now()).await?;

        self.mint_token_pair(stored.account_id, user_agent, ip).await
    }

    /// Logout always reports success regardless of whether the refresh token
    /// was already invalid — it only ever revokes a token, never asserts
    /// ownership or existence back to the caller.
    pub async fn logout(&self, req: LogoutRequest) -> Result<LogoutResponse, AuthError> {
        if let Ok(claims) = self.jwt.decode_refresh_token(&req.refresh_token) {
            if let Ok(jti) = uuid::Uuid::parse_str(&claims.jti) {
                if let Ok(Some(stored)) = self.repo.find_refresh_token_by_jti(jti).await {
                    let _ = self.repo.revoke_refresh_token(stored.id, Utc::now()).await;
                }
            }
        }
        Ok(LogoutResponse { ok: true })
    }

    pub async fn validate(&self, req: ValidateTokenRequest) -> Result<ValidateTokenResponse, AuthError> {
        let claims = match self.jwt.decode_token_for_validate(&req.access_token) {
            Ok(claims) => claims,
            Err(_) => return Ok(ValidateTokenResponse::invalid()),
        };

        let Ok(account_id) = claims.sub.parse::<i64>() else {
            return Ok(ValidateTokenResponse::invalid());
        };

        Ok(ValidateTokenResponse {
            valid: true,
            account_id: Some(account_id),
            client_id: Some(claims.sub),
            scopes: Vec::new(),
            exp: Some(claims.exp),
        })
    }

    async fn mint_token_pair(&self, account_id: i64, user_agent: Option<&str>, ip: Option<&str>) -> Result<TokenPairResponse, AuthError> {
        let access_token = self.jwt.issue_access_token(account_id)?;
        let (refresh_token, jti) = self.jwt.issue_refresh_token(account_id)?;

        let expires_at = Utc::now() + chrono::Duration::seconds(self.jwt.refresh_ttl_secs());
        self.repo
            .insert_refresh_token(account_id, jti, &hash_refresh_token(&refresh_token), expires_at, user_agent, ip)
            .await?;

        Ok(TokenPairResponse {
            token: access_token,
            refresh_token,
            expires_in: self.jwt.access_ttl_secs(),
            account_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_token_hash_is_deterministic_and_not_reversible_by_inspection() {
        let a = hash_refresh_token("same-token");
        let b = hash_refresh_token("same-token");
        assert_eq!(a, b);
        assert_ne!(a, "same-token");
        assert_eq!(a.len(), 64); // hex-encoded SHA-256
    }

    #[test]
    fn refresh_token_hash_differs_per_input() {
        assert_ne!(hash_refresh_token("token-a"), hash_refresh_token("token-b"));
    }
}
