use std::sync::Arc;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web_actors::ws;

use super::frames::{ClientFrame, ServerFrame};
use super::registry::ConnectionRegistry;

#[derive(Message)]
#[rtype(result = "()")]
pub struct SendText(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseSession {
    pub code: u16,
    pub reason: String,
}

/// One actor per live WebSocket connection. Holds nothing but what's needed
/// to route frames in and out; all cross-connection state lives in the
/// registry.
pub struct WsSession {
    pub connection_id: String,
    pub account_id: i64,
    pub heartbeat_sec: u64,
    pub registry: Arc<ConnectionRegistry>,
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let hello = ServerFrame::Hello {
            connection_id: self.connection_id.clone(),
            heartbeat_sec: self.heartbeat_sec,
        };
        ctx.text(hello.to_json());
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> actix::Running {
        self.registry.disconnect(&self.connection_id);
        actix::Running::Stop
    }
}

impl Handler<SendText> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<CloseSession> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: CloseSession, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::from(msg.code),
            description: Some(msg.reason),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let Ok(msg) = item else {
            ctx.stop();
            return;
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.registry.update_activity(&self.connection_id);
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.registry.update_activity(&self.connection_id);
            }
            ws::Message::Text(text) => {
                self.registry.update_activity(&self.connection_id);
                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Ping) => ctx.text(ServerFrame::Pong.to_json()),
                    Ok(_other) => {
                        // Command/subscribe/unsubscribe routing to domain
                        // services is outside this surface; accepted
                        // and acknowledged only at the transport level.
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %self.connection_id, error = %e, "unparseable client frame");
                    }
                }
            }
            ws::Message::Binary(_) => {
                self.registry.update_activity(&self.connection_id);
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) | ws::Message::Nop => {}
        }
    }
}
