//! Bit-exact AMQP topology names shared by every service on the bus.

pub mod exchanges {
    pub const RPC: &str = "core.rpc.v1";
    pub const EVENTS: &str = "core.events.v1";
    pub const DLX: &str = "core.dlx.v1";
}

pub mod queues {
    pub const AUTH_ISSUE_TOKEN: &str = "core.auth.rpc.issue_token.v1";
    pub const AUTH_VALIDATE_TOKEN: &str = "core.auth.rpc.validate_token.v1";
    pub const AUTH_REGISTER: &str = "core.auth.rpc.register.v1";
    pub const AUTH_REFRESH_TOKEN: &str = "core.auth.rpc.refresh_token.v1";
    pub const AUTH_LOGOUT: &str = "core.auth.rpc.logout.v1";

    pub const GATEWAY_WS_OUTBOUND: &str = "core.gateway.queue.ws_outbound.v1";
}

/// The broker pseudo-queue backing Direct Reply-to RPC.
pub const DIRECT_REPLY_TO: &str = "amq.rabbitmq.reply-to";

/// `Q.retry` for a given base queue name.
pub fn retry_queue_name(base: &str) -> String {
    format!("{base}.retry")
}

/// `Q.dlq` for a given base queue name.
pub fn dlq_name(base: &str) -> String {
    format!("{base}.dlq")
}

/// Name for a per-instance exclusive broadcast queue bound to `EVENTS`.
pub fn broadcast_queue_name(instance_tag: &str) -> String {
    format!("gateway.events.broadcast.{instance_tag}")
}
