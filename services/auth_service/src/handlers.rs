use std::sync::Arc;

use core_bus::{Listener, ListenerConfig, MessageBus, RpcHandlerAdapter};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{IssueTokenRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest, ValidateTokenRequest};
use crate::service::AuthService;

/// Starts one [`Listener`] per auth RPC queue, each wrapping [`AuthService`]
/// through [`RpcHandlerAdapter`] so the bus-facing plumbing is identical
/// across operations. Returns every worker's join handle so the caller can
/// await them after flipping `shutdown` during graceful shutdown.
pub fn start_all(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    handles.extend(start_register(bus.clone(), service.clone(), max_retries, shutdown.clone()));
    handles.extend(start_issue_token(bus.clone(), service.clone(), max_retries, shutdown.clone()));
    handles.extend(start_refresh_token(bus.clone(), service.clone(), max_retries, shutdown.clone()));
    handles.extend(start_logout(bus.clone(), service.clone(), max_retries, shutdown.clone()));
    handles.extend(start_validate_token(bus, service, max_retries, shutdown));
    handles
}

fn start_register(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let adapter = RpcHandlerAdapter::new(bus.clone(), move |req: RegisterRequest| {
        let service = service.clone();
        async move { service.register(req).await.map_err(|e| e.into_rpc()) }
    });

    Listener::new(bus, ListenerConfig::new(core_bus::names::queues::AUTH_REGISTER, 10, max_retries)).start(Arc::new(adapter), shutdown)
}

fn start_issue_token(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let adapter = RpcHandlerAdapter::new(bus.clone(), move |req: IssueTokenRequest| {
        let service = service.clone();
        async move { service.issue(req, None, None).await.map_err(|e| e.into_rpc()) }
    });

    Listener::new(bus, ListenerConfig::new(core_bus::names::queues::AUTH_ISSUE_TOKEN, 10, max_retries)).start(Arc::new(adapter), shutdown)
}

fn start_refresh_token(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let adapter = RpcHandlerAdapter::new(bus.clone(), move |req: RefreshTokenRequest| {
        let service = service.clone();
        async move { service.refresh(req, None, None).await.map_err(|e| e.into_rpc()) }
    });

    Listener::new(bus, ListenerConfig::new(core_bus::names::queues::AUTH_REFRESH_TOKEN, 10, max_retries)).start(Arc::new(adapter), shutdown)
}

fn start_logout(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let adapter = RpcHandlerAdapter::new(bus.clone(), move |req: LogoutRequest| {
        let service = service.clone();
        async move { service.logout(req).await.map_err(|e| e.into_rpc()) }
    });

    Listener::new(bus, ListenerConfig::new(core_bus::names::queues::AUTH_LOGOUT, 10, max_retries)).start(Arc::new(adapter), shutdown)
}

fn start_validate_token(bus: Arc<MessageBus>, service: Arc<AuthService>, max_retries: u64, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let adapter = RpcHandlerAdapter::new(bus.clone(), move |req: ValidateTokenRequest| {
        let service = service.clone();
        async move { service.validate(req).await.map_err(|e| e.into_rpc()) }
    });

    // Validation is on the hot path for every gateway WS connect; give it
    // more consumer workers than the other, lower-traffic RPC queues.
    Listener::new(
        bus,
        ListenerConfig::new(core_bus::names::queues::AUTH_VALIDATE_TOKEN, 20, max_retries).with_consumer_count(4),
    )
    .start(Arc::new(adapter), shutdown)
}
