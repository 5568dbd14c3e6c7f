mod config;
mod db;
mod errors;
mod handlers;
mod jwt;
mod models;
mod redis_store;
mod service;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use core_bus::{names, MessageBus};
use db::AuthRepository;
use deadpool_redis::{Config as RedisConfig, Runtime};
use jwt::JwtManager;
use redis_store::LoginRateLimiter;
use service::AuthService;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect({
            let schema = config.db_schema.clone();
            move |conn, _meta| {
                let schema = schema.clone();
                Box::pin(async move {
                    sqlx::query(&format!("SET search_path TO {schema}, public")).execute(conn).await?;
                    Ok(())
                })
            }
        })
        .connect(&config.database_url)
        .await?;

    let mut redis_config = RedisConfig::from_url(redis_url_with_password(&config));
    redis_config.pool = Some(deadpool_redis::PoolConfig::new(config.redis_pool_size));
    let redis_pool = redis_config.create_pool(Some(Runtime::Tokio1))?;

    let bus = Arc::new(
        MessageBus::connect(
            &config.rabbitmq_dsn,
            Duration::from_secs(config.rabbitmq_connect_timeout_secs),
            Duration::from_millis(config.rpc_timeout_ms),
        )
        .await?,
    );

    declare_topology(&bus, &config).await?;

    let repo = Arc::new(AuthRepository::new(db_pool));
    let jwt_manager = Arc::new(JwtManager::new(
        config.jwt_secret.clone(),
        config.auth_jwt_iss.clone(),
        config.auth_jwt_aud.clone(),
        config.auth_access_ttl,
        config.auth_refresh_ttl,
    ));
    let rate_limiter = Arc::new(LoginRateLimiter::new(
        redis_pool.clone(),
        config.redis_login_max_attempts,
        config.redis_ttl_login_window_sec,
        config.redis_ttl_login_ban_sec,
    ));

    let auth_service = Arc::new(AuthService::new(repo.clone(), jwt_manager, rate_limiter));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let listener_handles = handlers::start_all(bus.clone(), auth_service, config.rpc_max_retries, shutdown_rx);

    tracing::info!("auth_service: listeners started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("auth_service: shutdown signal received");

    let _ = shutdown_tx.send(true);
    for handle in listener_handles {
        let _ = handle.await;
    }
    tracing::info!("auth_service: listeners stopped");

    bus.close().await?;
    repo.pool().close().await;
    redis_pool.close();
    tracing::info!("auth_service: shutdown complete");

    Ok(())
}

fn redis_url_with_password(config: &Config) -> String {
    match &config.redis_password {
        Some(password) if !password.is_empty() => {
            let (scheme, rest) = config
                .redis_url
                .split_once("://")
                .unwrap_or(("redis", config.redis_url.as_str()));
            format!("{scheme}://:{password}@{rest}")
        }
        _ => config.redis_url.clone(),
    }
}

async fn declare_topology(bus: &MessageBus, config: &Config) -> anyhow::Result<()> {
    core_bus::topology::declare_core_exchanges(bus).await?;

    for queue in [
        names::queues::AUTH_REGISTER,
        names::queues::AUTH_ISSUE_TOKEN,
        names::queues::AUTH_REFRESH_TOKEN,
        names::queues::AUTH_LOGOUT,
        names::queues::AUTH_VALIDATE_TOKEN,
    ] {
        core_bus::topology::declare_rpc_queue_with_retry(bus, queue, config.rpc_retry_delay_ms).await?;
    }

    Ok(())
}
