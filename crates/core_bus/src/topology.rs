use lapin::ExchangeKind;

use crate::bus::{MessageBus, QueueArgs};
use crate::error::BusError;
use crate::names::{dlq_name, exchanges, retry_queue_name};

/// Declares the three durable exchanges shared by every service: `RPC`
/// (direct), `EVENTS` (topic), `DLX` (direct). Idempotent.
pub async fn declare_core_exchanges(bus: &MessageBus) -> Result<(), BusError> {
    bus.declare_exchange(exchanges::RPC, ExchangeKind::Direct, true).await?;
    bus.declare_exchange(exchanges::EVENTS, ExchangeKind::Topic, true).await?;
    bus.declare_exchange(exchanges::DLX, ExchangeKind::Direct, true).await?;
    Ok(())
}

/// Declares the retry triad for one RPC base queue `Q`:
///
/// - `Q.dlq` bound to `DLX` with routing key `Q.dlq`.
/// - `Q.retry` (TTL = `retry_delay_ms`, dead-letters back to `Q` via `RPC`) bound to `DLX` with routing key `Q.retry`.
/// - `Q` (dead-letters to `Q.retry` via `DLX`) bound to `RPC` with routing key `Q`.
pub async fn declare_rpc_queue_with_retry(bus: &MessageBus, base_queue: &str, retry_delay_ms: i64) -> Result<(), BusError> {
    let retry_queue = retry_queue_name(base_queue);
    let dlq = dlq_name(base_queue);

    bus.declare_queue(&dlq, true, false, false, QueueArgs::default()).await?;
    bus.bind_queue(&dlq, exchanges::DLX, &dlq).await?;

    bus.declare_queue(
        &retry_queue,
        true,
        false,
        false,
        QueueArgs {
            dead_letter_exchange: Some(exchanges::RPC.to_string()),
            dead_letter_routing_key: Some(base_queue.to_string()),
            message_ttl_ms: Some(retry_delay_ms),
            ..Default::default()
        },
    )
    .await?;
    bus.bind_queue(&retry_queue, exchanges::DLX, &retry_queue).await?;

    bus.declare_queue(
        base_queue,
        true,
        false,
        false,
        QueueArgs {
            dead_letter_exchange: Some(exchanges::DLX.to_string()),
            dead_letter_routing_key: Some(retry_queue.clone()),
            ..Default::default()
        },
    )
    .await?;
    bus.bind_queue(base_queue, exchanges::RPC, base_queue).await?;

    Ok(())
}

/// Declares an exclusive, auto-delete, non-durable per-instance broadcast
/// queue bound to `EVENTS` with the catch-all pattern `#`.
pub async fn declare_broadcast_queue(bus: &MessageBus, queue_name: &str) -> Result<(), BusError> {
    bus.declare_queue(queue_name, false, true, true, QueueArgs::default()).await?;
    bus.bind_queue(queue_name, exchanges::EVENTS, "#").await?;
    Ok(())
}

/// Declares the durable shared outbound queue the dispatcher consumes.
pub async fn declare_outbound_queue(bus: &MessageBus, queue_name: &str) -> Result<(), BusError> {
    bus.declare_queue(queue_name, true, false, false, QueueArgs::default()).await?;
    Ok(())
}
