use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AuthError;
use crate::models::{Account, AccountWithCredentials, Credentials, RefreshTokenRecord};

/// Repository boundary over Account/Credentials/RefreshToken. ORM table
/// definitions and migrations are out of scope; this is the narrow slice of
/// persistence the auth service actually needs.
pub struct AuthRepository {
    pool: PgPool,
}

impl AuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_account_by_username(&self, username: &str) -> Result<Option<AccountWithCredentials>, AuthError> {
        let row = sqlx::query_as::<_, AccountWithCredentials>(
            r#"
            SELECT
                a.id, a.username, a.email, a.status, a.role, a.created_at, a.updated_at,
                c.account_id, c.password_hash, c.password_updated_at, c.last_login_at,
                c.failed_attempts, c.locked_until
            FROM accounts a
            JOIN credentials c ON c.account_id = a.id
            WHERE a.username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_account_by_username_or_email_ci(&self, username: &str, email: &str) -> Result<bool, AuthError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM accounts
                WHERE username = $1 OR lower(email) = lower($2)
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    /// Inserts Account + Credentials in one transaction. The username/email
    /// existence check races against concurrent registrations, so a unique
    /// violation surfacing here from the database is still a legitimate
    /// "already registered" outcome, not an infra failure — it's mapped to
    /// [`AuthError::UserExists`] directly rather than falling through to
    /// [`AuthError::Internal`].
    pub async fn insert_account_and_credentials(&self, username: &str, email: &str, password_hash: &str) -> Result<Account, AuthError> {
        let mut tx = self.pool.begin().await?;

        let account: Account = sqlx::query_as(
            r#"
            INSERT INTO accounts (username, email, status, role, created_at, updated_at)
            VALUES ($1, lower($2), 'active', 'user', now(), now())
            RETURNING id, username, email, status, role, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        sqlx::query(
            r#"
            INSERT INTO credentials (account_id, password_hash, password_updated_at, failed_attempts)
            VALUES ($1, $2, now(), 0)
            "#,
        )
        .bind(account.id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    pub async fn set_last_login(&self, account_id: i64, when: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE credentials SET last_login_at = $1 WHERE account_id = $2")
            .bind(when)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_refresh_token(
        &self,
        account_id: i64,
        jti: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        user_agent: Option<&str>,
        ip: Option<&str>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (account_id, jti, token_hash, user_agent, ip, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, now(), $6, NULL)
            "#,
        )
        .bind(account_id)
        .bind(jti)
        .bind(token_hash)
        .bind(user_agent)
        .bind(ip)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_refresh_token_by_jti(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query_as(
            r#"
            SELECT id, account_id, jti, token_hash, user_agent, ip, created_at, expires_at, revoked_at
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_account_by_id(&self, account_id: i64) -> Result<Option<Account>, AuthError> {
        let row = sqlx::query_as(
            r#"
            SELECT id, username, email, status, role, created_at, updated_at
            FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn revoke_refresh_token(&self, id: i64, when: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL")
            .bind(when)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Postgres SQLSTATE for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

fn map_unique_violation(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AuthError::UserExists;
        }
    }
    AuthError::from(e)
}
