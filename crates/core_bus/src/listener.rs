use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{delivery_meta, MessageBus, PublishOptions};
use crate::envelope::DeliveryMeta;
use crate::names::{dlq_name, exchanges};

/// A typed-or-untyped handler invoked once per validated delivery.
///
/// Any `Err` returned here is treated uniformly as a transient failure: the
/// delivery is rejected without requeue so the broker's DLX/retry cycle
/// takes over. There is no distinction at this layer between "retry me" and
/// "give up" — that split only exists between JSON-parse failures (always
/// DLQ, handled before this is even called) and handler failures (always
/// reject-no-requeue).
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, body: Value, meta: DeliveryMeta) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> DeliveryHandler for F
where
    F: Fn(Value, DeliveryMeta) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, body: Value, meta: DeliveryMeta) -> anyhow::Result<()> {
        (self)(body, meta).await
    }
}

pub struct ListenerConfig {
    pub queue: String,
    pub prefetch: u16,
    pub max_retries: u64,
    /// Number of independent consumer workers to launch on this queue.
    pub consumer_count: u16,
}

impl ListenerConfig {
    pub fn new(queue: impl Into<String>, prefetch: u16, max_retries: u64) -> Self {
        Self {
            queue: queue.into(),
            prefetch,
            max_retries,
            consumer_count: 1,
        }
    }

    pub fn with_consumer_count(mut self, count: u16) -> Self {
        self.consumer_count = count;
        self
    }
}

/// Turns a raw broker delivery into a validated JSON body, invokes the
/// handler, and manages ack/nack per the retry policy in one place so every
/// queue consumer in the system gets the same correctness guarantees: every
/// delivery resolves in exactly one of {ack, DLQ-then-ack, reject-no-requeue}.
pub struct Listener {
    bus: Arc<MessageBus>,
    config: ListenerConfig,
}

impl Listener {
    pub fn new(bus: Arc<MessageBus>, config: ListenerConfig) -> Self {
        Self { bus, config }
    }

    /// Spawns `consumer_count` independent consumer tasks and returns their
    /// join handles. Each acks independently; this never blocks the caller.
    /// `shutdown` flipping to `true` stops every worker from picking up a new
    /// delivery — in-flight deliveries still run to completion.
    pub fn start(self, handler: Arc<dyn DeliveryHandler>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.consumer_count.max(1) as usize);
        for worker in 0..self.config.consumer_count.max(1) {
            let bus = self.bus.clone();
            let handler = handler.clone();
            let queue = self.config.queue.clone();
            let prefetch = self.config.prefetch;
            let max_retries = self.config.max_retries;
            let consumer_tag = format!("{queue}-worker-{worker}");
            let shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                if let Err(e) = run_consumer(bus, queue.clone(), consumer_tag, prefetch, max_retries, handler, shutdown).await {
                    tracing::error!(queue, error = %e, "listener consumer terminated");
                }
            }));
        }
        handles
    }
}

async fn run_consumer(
    bus: Arc<MessageBus>,
    queue: String,
    consumer_tag: String,
    prefetch: u16,
    max_retries: u64,
    handler: Arc<dyn DeliveryHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut consumer = bus.consume_raw(&queue, &consumer_tag, prefetch).await?;

    loop {
        let delivery = tokio::select! {
            biased;
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    tracing::info!(queue, "listener stopping, cancelling consumer");
                    break;
                }
                continue;
            }
            next = consumer.next() => match next {
                Some(Ok(d)) => d,
                Some(Err(e)) => {
                    tracing::warn!(queue, error = %e, "failed to receive delivery");
                    continue;
                }
                None => break,
            },
        };

        let meta = delivery_meta(&delivery);

        // Step 1/2: the broker-stamped x-death count is the authoritative
        // retry counter. Once it's exhausted, forward straight to the DLQ
        // and ack — no further broker-driven retry.
        if meta.retry_count >= max_retries {
            tracing::warn!(queue, retry_count = meta.retry_count, max_retries, "retries exhausted, routing to dlq");
            if let Err(e) = forward_to_dlq(&bus, &queue, &delivery.data, meta.correlation_id.as_deref()).await {
                tracing::error!(queue, error = %e, "failed to forward exhausted delivery to dlq");
            }
            let _ = delivery.ack(BasicAckOptions::default()).await;
            continue;
        }

        // Step 3: envelope must at least be JSON. Schema-invalid bodies are
        // terminal by policy — they never spin through the retry cycle.
        let body: Value = match serde_json::from_slice(&delivery.data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(queue, error = %e, "invalid json envelope, routing to dlq");
                if let Err(e) = forward_to_dlq(&bus, &queue, &delivery.data, meta.correlation_id.as_deref()).await {
                    tracing::error!(queue, error = %e, "failed to forward invalid envelope to dlq");
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
                continue;
            }
        };

        // Step 4: run the handler and ack/reject based on its outcome.
        match handler.handle(body, meta).await {
            Ok(()) => {
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::warn!(queue, error = %e, "handler failed, rejecting without requeue");
                let _ = delivery
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: false,
                    })
                    .await;
            }
        }
    }

    Ok(())
}

async fn forward_to_dlq(bus: &MessageBus, base_queue: &str, raw_body: &[u8], correlation_id: Option<&str>) -> anyhow::Result<()> {
    let body: Value = serde_json::from_slice(raw_body).unwrap_or(Value::Null);
    bus.publish(
        exchanges::DLX,
        &dlq_name(base_queue),
        &body,
        PublishOptions {
            correlation_id: correlation_id.map(|c| c.to_string()),
            persistent: true,
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}
