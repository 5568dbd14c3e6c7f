use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use core_bus::MessageBus;

mod config;
mod handlers;
mod middleware;
mod ws;

use config::Config;
use handlers::AppState;
use middleware::CorrelationId;
use ws::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let bus = Arc::new(
        MessageBus::connect(
            &config.rabbitmq_dsn,
            Duration::from_secs(config.rabbitmq_connect_timeout_secs),
            Duration::from_millis(config.rpc_timeout_ms),
        )
        .await?,
    );

    core_bus::topology::declare_core_exchanges(&bus).await?;
    core_bus::topology::declare_outbound_queue(&bus, core_bus::names::queues::GATEWAY_WS_OUTBOUND).await?;

    let bus_ready = Arc::new(AtomicBool::new(true));
    let registry = ConnectionRegistry::new();

    ws::dispatcher::start(bus.clone(), registry.clone(), config.rpc_max_retries);
    ws::broadcaster::start(bus.clone(), registry.clone()).await?;

    let (sweeper_handle, sweeper_shutdown) = ws::sweeper::spawn(
        registry.clone(),
        Duration::from_secs(config.gateway_ws_ping_interval),
        Duration::from_secs(config.gateway_ws_idle_timeout),
    );

    let state = web::Data::new(AppState {
        bus: bus.clone(),
        registry,
        bus_ready,
        ws_ping_interval_sec: config.gateway_ws_ping_interval,
    });

    let http_addr = config.http_addr.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(CorrelationId)
            .app_data(state.clone())
            .route("/health", web::get().to(handlers::health))
            .route("/ready", web::get().to(handlers::ready))
            .route("/v1/connect", web::get().to(handlers::connect))
    })
    .bind(http_addr)?
    .workers(num_cpus::get().max(2))
    .run();

    let server_handle = server.handle();
    tokio::spawn(server);

    tokio::signal::ctrl_c().await?;
    tracing::info!("api_gateway: shutdown signal received");

    server_handle.stop(true).await;
    let _ = sweeper_shutdown.send(());
    let _ = sweeper_handle.await;
    bus.close().await?;

    Ok(())
}
