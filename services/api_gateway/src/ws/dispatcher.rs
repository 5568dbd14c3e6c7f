use std::sync::Arc;

use core_bus::{names, DeliveryMeta, Listener, ListenerConfig, MessageBus};
use serde_json::Value;

use super::frames::OutboundMessage;
use super::registry::ConnectionRegistry;

/// Starts the outbound dispatcher: consumes the durable outbound
/// queue and routes each message to the connection and/or account it names.
/// If no recipient resolves, or the recipient has no live local session, the
/// message is dropped — another instance may own the session, and there is
/// no global session directory to check against.
pub fn start(bus: Arc<MessageBus>, registry: Arc<ConnectionRegistry>, max_retries: u64) {
    let handler = move |body: Value, _meta: DeliveryMeta| {
        let registry = registry.clone();
        async move {
            let msg: OutboundMessage = serde_json::from_value(body)?;
            let connection_id = msg.connection_id.clone();
            let account_id = msg.account_id;
            let frame = msg.into_frame().to_json();

            match (connection_id, account_id) {
                (Some(id), _) => {
                    if !registry.send(&id, frame) {
                        tracing::debug!(connection_id = %id, "outbound message dropped, no live session");
                    }
                }
                (None, Some(account_id)) => {
                    let delivered = registry.send_by_account(account_id, &frame);
                    if delivered == 0 {
                        tracing::debug!(account_id, "outbound message dropped, no live session for account");
                    }
                }
                (None, None) => {
                    tracing::warn!("outbound message has no resolvable recipient, dropping");
                }
            }

            Ok(())
        }
    };

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    Listener::new(bus, ListenerConfig::new(names::queues::GATEWAY_WS_OUTBOUND, 20, max_retries)).start(Arc::new(handler), shutdown_rx);
}
