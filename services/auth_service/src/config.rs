use serde::Deserialize;

/// Env-var driven configuration, loaded the way the gateway's `Config::from_env`
/// already does it: `dotenvy` for local `.env` files, `envy` to deserialize the
/// process environment straight into a typed struct.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rabbitmq_dsn: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub rabbitmq_connect_timeout_secs: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u64,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: i64,

    pub database_url: String,
    #[serde(default = "default_db_schema")]
    pub db_schema: String,

    pub redis_url: String,
    pub redis_password: Option<String>,
    #[serde(default = "default_redis_pool_size")]
    pub redis_pool_size: usize,
    #[serde(default = "default_login_max_attempts")]
    pub redis_login_max_attempts: u32,
    #[serde(default = "default_login_ban_sec")]
    pub redis_ttl_login_ban_sec: u64,
    #[serde(default = "default_login_window_sec")]
    pub redis_ttl_login_window_sec: u64,

    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub auth_access_ttl: i64,
    #[serde(default = "default_refresh_ttl")]
    pub auth_refresh_ttl: i64,
    #[serde(default = "default_jwt_iss")]
    pub auth_jwt_iss: String,
    #[serde(default = "default_jwt_aud")]
    pub auth_jwt_aud: String,
}

fn default_connect_timeout_secs() -> u64 {
    60
}
fn default_rpc_timeout_ms() -> u64 {
    5_000
}
fn default_rpc_max_retries() -> u64 {
    3
}
fn default_rpc_retry_delay_ms() -> i64 {
    5_000
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_login_max_attempts() -> u32 {
    10
}
fn default_login_ban_sec() -> u64 {
    900
}
fn default_login_window_sec() -> u64 {
    300
}
fn default_access_ttl() -> i64 {
    1_800
}
fn default_refresh_ttl() -> i64 {
    1_209_600
}
fn default_jwt_iss() -> String {
    "auth_service".to_string()
}
fn default_jwt_aud() -> String {
    String::new()
}
fn default_db_schema() -> String {
    "public".to_string()
}

impl Config {
    pub fn from_env() -> Self {
        envy::from_env().expect("invalid env")
    }
}
