//! The message-bus abstraction shared by every service on the fabric:
//! publisher-confirmed AMQP publish/consume, Direct Reply-to RPC, the
//! Dead-Letter + delayed-retry topology, and the listener/handler framework
//! built on top of it.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod names;
pub mod rpc_handler;
pub mod topology;

pub use bus::{MessageBus, PublishOptions, QueueArgs};
pub use envelope::{DeliveryMeta, RpcEnvelope};
pub use error::{BusError, ErrorCode};
pub use listener::{DeliveryHandler, Listener, ListenerConfig};
pub use rpc_handler::{HandlerResult, RpcHandlerAdapter};

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{AMQPValue, FieldArray, FieldTable};

    #[test]
    fn envelope_ok_round_trips_through_json() {
        let env = RpcEnvelope::ok(serde_json::json!({"a": 1}), "corr-1");
        let json = serde_json::to_string(&env).unwrap();
        let back: RpcEnvelope<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert!(back.success);
        assert_eq!(back.correlation_id, "corr-1");
        assert!(back.error_code.is_none());
    }

    #[test]
    fn envelope_err_carries_stable_code_string() {
        let env: RpcEnvelope<()> = RpcEnvelope::err(ErrorCode::AuthInvalidCredentials, "bad creds", "corr-2");
        assert!(!env.success);
        assert_eq!(env.error_code.as_deref(), Some("auth.invalid_credentials"));
    }

    #[test]
    fn retry_count_absent_headers_is_zero() {
        assert_eq!(bus::retry_count_from_headers(None), 0);
    }

    #[test]
    fn retry_count_reads_first_x_death_entry() {
        let mut death = FieldTable::default();
        death.insert("count".into(), AMQPValue::LongLongInt(2));
        let arr = FieldArray::from(vec![AMQPValue::FieldTable(death)]);
        let mut headers = FieldTable::default();
        headers.insert("x-death".into(), AMQPValue::FieldArray(arr));

        assert_eq!(bus::retry_count_from_headers(Some(&headers)), 2);
    }

    #[test]
    fn topology_names_are_bit_exact() {
        assert_eq!(names::exchanges::RPC, "core.rpc.v1");
        assert_eq!(names::exchanges::EVENTS, "core.events.v1");
        assert_eq!(names::exchanges::DLX, "core.dlx.v1");
        assert_eq!(names::queues::AUTH_ISSUE_TOKEN, "core.auth.rpc.issue_token.v1");
        assert_eq!(names::queues::AUTH_VALIDATE_TOKEN, "core.auth.rpc.validate_token.v1");
        assert_eq!(names::queues::AUTH_REGISTER, "core.auth.rpc.register.v1");
        assert_eq!(names::queues::AUTH_REFRESH_TOKEN, "core.auth.rpc.refresh_token.v1");
        assert_eq!(names::queues::AUTH_LOGOUT, "core.auth.rpc.logout.v1");
        assert_eq!(names::queues::GATEWAY_WS_OUTBOUND, "core.gateway.queue.ws_outbound.v1");
        assert_eq!(names::DIRECT_REPLY_TO, "amq.rabbitmq.reply-to");
    }

    #[test]
    fn retry_and_dlq_names_derive_from_base() {
        assert_eq!(names::retry_queue_name("core.auth.rpc.issue_token.v1"), "core.auth.rpc.issue_token.v1.retry");
        assert_eq!(names::dlq_name("core.auth.rpc.issue_token.v1"), "core.auth.rpc.issue_token.v1.dlq");
    }

    #[test]
    fn broadcast_queue_name_embeds_instance_tag() {
        assert_eq!(names::broadcast_queue_name("abc123"), "gateway.events.broadcast.abc123");
    }
}
