use serde::Deserialize;

/// Env-var driven configuration for the gateway binary, loaded the same way
/// as the rest of the fabric: `dotenvy` for local `.env` files, `envy` to
/// deserialize the process environment into a typed struct.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub http_addr: String,

    pub rabbitmq_dsn: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub rabbitmq_connect_timeout_secs: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u64,

    #[serde(default = "default_ws_ping_interval_secs")]
    pub gateway_ws_ping_interval: u64,
    #[serde(default = "default_ws_idle_timeout_secs")]
    pub gateway_ws_idle_timeout: u64,
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
fn default_ws_ping_interval_secs() -> u64 {
    20
}
fn default_ws_idle_timeout_secs() -> u64 {
    60
}

impl Config {
    pub fn from_env() -> Self {
        envy::from_env().expect("invalid env")
    }
}
