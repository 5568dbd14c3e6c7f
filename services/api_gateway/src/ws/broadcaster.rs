use std::sync::Arc;

use core_bus::{names, MessageBus};
use futures_util::StreamExt;
use lapin::options::BasicAckOptions;
use serde_json::{json, Value};
use uuid::Uuid;

use super::registry::ConnectionRegistry;

/// Starts the event broadcaster. Each gateway instance declares its
/// own exclusive, auto-delete queue bound to the events topic exchange with
/// the catch-all pattern `#`, so cross-instance fan-out falls out of every
/// instance having its own binding rather than any explicit routing table.
pub async fn start(bus: Arc<MessageBus>, registry: Arc<ConnectionRegistry>) -> anyhow::Result<()> {
    let instance_tag = Uuid::new_v4().simple().to_string();
    let queue_name = names::broadcast_queue_name(&instance_tag);

    core_bus::topology::declare_broadcast_queue(&bus, &queue_name).await?;

    let mut consumer = bus.consume_raw(&queue_name, &format!("broadcaster-{instance_tag}"), 50).await?;

    tokio::spawn(async move {
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, "broadcaster consumer error");
                    continue;
                }
            };

            let routing_key = delivery.routing_key.to_string();
            let payload: Value = serde_json::from_slice(&delivery.data).unwrap_or(Value::Null);

            let frame = json!({
                "type": "event",
                "topic": routing_key,
                "payload": payload,
            });

            let delivered = registry.broadcast(None, &frame.to_string());
            tracing::trace!(delivered, "event broadcast to local sessions");

            let _ = delivery.ack(BasicAckOptions::default()).await;
        }
    });

    Ok(())
}
