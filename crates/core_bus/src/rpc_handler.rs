use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::envelope::{DeliveryMeta, RpcEnvelope};
use crate::error::ErrorCode;
use crate::listener::DeliveryHandler;

/// The typed outcome of a domain handler: either a response payload or a
/// wire-stable error code plus a human message.
pub type HandlerResult<Res> = Result<Res, (ErrorCode, String)>;

/// Wraps a typed handler `(Request) -> Response|Error` and a [`MessageBus`]
/// so every RPC queue consumer (C4) gets the same envelope handling:
///
/// - extracts `payload` if the body wraps one, otherwise treats the whole
///   body as the payload;
/// - deserializes into the typed request; on failure, emits
///   `validation.failed` to `reply_to` and considers the delivery handled
///   (not retried — schema failures are terminal by policy);
/// - runs the handler; a recognized business outcome (success or a named
///   error code) is normalized into the uniform envelope and published to
///   `reply_to` if present (fire-and-forget if absent); an infra-flagged
///   error code ([`ErrorCode::is_infra`]) is propagated as a handler failure
///   instead, so the delivery is rejected without requeue and retried by the
///   broker's DLX cycle rather than answered immediately.
pub struct RpcHandlerAdapter<Req, Res, F> {
    bus: Arc<MessageBus>,
    handler: F,
    _marker: std::marker::PhantomData<fn(Req) -> Res>,
}

impl<Req, Res, F, Fut> RpcHandlerAdapter<Req, Res, F>
where
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
{
    pub fn new(bus: Arc<MessageBus>, handler: F) -> Self {
        Self {
            bus,
            handler,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Res, F, Fut> DeliveryHandler for RpcHandlerAdapter<Req, Res, F>
where
    Req: DeserializeOwned + Send + Sync + 'static,
    Res: Serialize + Send + Sync + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
{
    async fn handle(&self, body: Value, meta: DeliveryMeta) -> anyhow::Result<()> {
        let correlation_id = meta.correlation_id.clone().unwrap_or_default();

        // Envelopes wrapping the actual request under a `payload` field are
        // unwrapped transparently; a flat body is used as-is.
        let payload = match body {
            Value::Object(ref map) if map.contains_key("payload") => map["payload"].clone(),
            other => other,
        };

        let request: Req = match serde_json::from_value(payload) {
            Ok(req) => req,
            Err(e) => {
                let envelope = RpcEnvelope::<Res>::err(ErrorCode::ValidationFailed, e.to_string(), &correlation_id);
                self.reply(&meta, &envelope).await?;
                return Ok(());
            }
        };

        let envelope = match (self.handler)(request).await {
            Ok(response) => RpcEnvelope::ok(response, &correlation_id),
            // Infra failures (DB/Redis/bus hiccups) are not replied to the
            // caller as a business outcome — they're handed back as an error
            // so the listener rejects without requeue and the broker's
            // retry/DLQ cycle takes over.
            Err((code, message)) if code.is_infra() => return Err(anyhow::anyhow!(message)),
            Err((code, message)) => RpcEnvelope::err(code, message, &correlation_id),
        };

        self.reply(&meta, &envelope).await?;
        Ok(())
    }
}

impl<Req, Res, F> RpcHandlerAdapter<Req, Res, F> {
    async fn reply<T: Serialize + Sync>(&self, meta: &DeliveryMeta, envelope: &RpcEnvelope<T>) -> anyhow::Result<()> {
        let Some(reply_to) = meta.reply_to.as_deref() else {
            return Ok(());
        };
        self.bus
            .publish_rpc_response(reply_to, envelope, &envelope.correlation_id)
            .await?;
        Ok(())
    }
}
