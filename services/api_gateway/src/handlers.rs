use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use core_bus::{names, MessageBus};
use rand::Rng;
use serde_json::{json, Value};

use crate::ws::registry::ConnectionRegistry;
use crate::ws::session::WsSession;

pub struct AppState {
    pub bus: Arc<MessageBus>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus_ready: Arc<AtomicBool>,
    pub ws_ping_interval_sec: u64,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "ok",
        "data": null,
    }))
}

pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    if state.bus_ready.load(Ordering::SeqCst) {
        HttpResponse::Ok().json(json!({
            "success": true,
            "message": "ready",
            "data": null,
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(json!({
            "success": false,
            "message": "bus_not_ready",
            "error": "message bus not connected",
        }))
    }
}

const DEFAULT_CLIENT_TYPE: &str = "default";

#[derive(serde::Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
    client_type: Option<String>,
}

/// `GET /v1/connect`. Extracts a bearer token from the `Authorization`
/// header or a `token` query parameter, validates it against the auth
/// service, and on success upgrades to a WebSocket session.
pub async fn connect(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let token = extract_token(&req, &query);

    let Some(token) = token else {
        return Ok(HttpResponse::Unauthorized().json(json!({
            "success": false,
            "error_code": "auth.invalid_token",
            "message": "missing access token",
        })));
    };

    let account_id = match validate_token(&state.bus, &token).await {
        Some(id) => id,
        None => {
            return Ok(HttpResponse::Unauthorized().json(json!({
                "success": false,
                "error_code": "auth.invalid_token",
                "message": "invalid or expired access token",
            })));
        }
    };

    let connection_id = format!("ws_{account_id}_{}", random_hex8());
    let client_type = query.client_type.clone().unwrap_or_else(|| DEFAULT_CLIENT_TYPE.to_string());

    let session = WsSession {
        connection_id: connection_id.clone(),
        account_id,
        heartbeat_sec: state.ws_ping_interval_sec,
        registry: state.registry.clone(),
    };

    let (addr, response) = ws::start_with_addr(session, &req, stream)?;
    state
        .registry
        .connect(connection_id, client_type, account_id, addr.clone().recipient(), addr.recipient());

    Ok(response)
}

fn extract_token(req: &HttpRequest, query: &ConnectQuery) -> Option<String> {
    if let Some(header) = req.headers().get("authorization") {
        if let Ok(value) = header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    query.token.clone()
}

async fn validate_token(bus: &MessageBus, token: &str) -> Option<i64> {
    let response = bus
        .call_rpc(
            names::exchanges::RPC,
            names::queues::AUTH_VALIDATE_TOKEN,
            &json!({ "access_token": token }),
            None,
        )
        .await
        .ok()?;

    parse_validate_response(&response)
}

fn parse_validate_response(response: &Value) -> Option<i64> {
    if response.get("success")?.as_bool()? {
        response.get("data")?.get("account_id")?.as_i64()
    } else {
        None
    }
}

fn random_hex8() -> String {
    let n: u32 = rand::thread_rng().gen();
    format!("{n:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_id_from_successful_envelope() {
        let body = json!({"success": true, "data": {"valid": true, "account_id": 42}});
        assert_eq!(parse_validate_response(&body), Some(42));
    }

    #[test]
    fn rejects_unsuccessful_envelope() {
        let body = json!({"success": false, "error_code": "auth.invalid_token"});
        assert_eq!(parse_validate_response(&body), None);
    }
}
