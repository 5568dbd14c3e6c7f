use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

use crate::envelope::DeliveryMeta;
use crate::error::BusError;
use crate::names::DIRECT_REPLY_TO;

/// Arguments accepted by [`MessageBus::declare_queue`], matching the subset
/// of `x-*` queue arguments this fabric relies on.
#[derive(Debug, Clone, Default)]
pub struct QueueArgs {
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    pub message_ttl_ms: Option<i64>,
    pub max_priority: Option<i16>,
}

impl QueueArgs {
    fn into_field_table(self) -> FieldTable {
        let mut table = FieldTable::default();
        if let Some(dlx) = self.dead_letter_exchange {
            table.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(dlx.into()));
        }
        if let Some(dlrk) = self.dead_letter_routing_key {
            table.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(dlrk.into()),
            );
        }
        if let Some(ttl) = self.message_ttl_ms {
            table.insert("x-message-ttl".into(), AMQPValue::LongLongInt(ttl));
        }
        if let Some(max_priority) = self.max_priority {
            table.insert("x-max-priority".into(), AMQPValue::ShortShortInt(max_priority as i8));
        }
        table
    }
}

/// Options accepted by [`MessageBus::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub persistent: bool,
    pub mandatory: bool,
}

type PendingReplies = Arc<DashMap<String, oneshot::Sender<Value>>>;

/// AMQP client wrapping publisher confirms, idempotent topology declaration,
/// and Direct Reply-to RPC on top of a single `lapin` channel per concern.
pub struct MessageBus {
    connection: Connection,
    publish_channel: Channel,
    consume_channel: Channel,
    pending_replies: PendingReplies,
    rpc_timeout: Duration,
}

impl MessageBus {
    /// Opens a robust connection, retrying with capped exponential backoff
    /// until `connect_timeout` elapses, then enables publisher confirms and
    /// starts the Direct Reply-to consumer.
    pub async fn connect(amqp_url: &str, connect_timeout: Duration, rpc_timeout: Duration) -> Result<Self, BusError> {
        let deadline = Instant::now() + connect_timeout;
        let mut delay = Duration::from_secs(1);

        let connection = loop {
            match Connection::connect(amqp_url, ConnectionProperties::default()).await {
                Ok(conn) => break conn,
                Err(e) if Instant::now() < deadline => {
                    tracing::warn!(error = %e, delay_secs = delay.as_secs(), "bus connect failed, retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
                Err(e) => return Err(BusError::BusUnavailable(e.to_string())),
            }
        };

        let publish_channel = connection.create_channel().await?;
        publish_channel
            .confirm_select(lapin::options::ConfirmSelectOptions::default())
            .await?;

        let consume_channel = connection.create_channel().await?;

        let pending_replies: PendingReplies = Arc::new(DashMap::new());

        let bus = Self {
            connection,
            publish_channel,
            consume_channel,
            pending_replies: pending_replies.clone(),
            rpc_timeout,
        };

        bus.start_direct_reply_consumer().await?;

        tracing::info!("bus: connected");
        Ok(bus)
    }

    async fn start_direct_reply_consumer(&self) -> Result<(), BusError> {
        let mut consumer = self
            .consume_channel
            .basic_consume(
                DIRECT_REPLY_TO,
                "core-bus-direct-reply",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let pending_replies = self.pending_replies.clone();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "direct reply-to consumer error");
                        continue;
                    }
                };

                let correlation_id = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|c| c.to_string());

                let Some(correlation_id) = correlation_id else {
                    tracing::warn!("rpc reply with no correlation_id dropped");
                    continue;
                };

                let body: Value = match serde_json::from_slice(&delivery.data) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, %correlation_id, "rpc reply body not valid json, dropped");
                        continue;
                    }
                };

                match pending_replies.remove(&correlation_id) {
                    Some((_, sender)) => {
                        let _ = sender.send(body);
                    }
                    None => {
                        tracing::warn!(%correlation_id, "rpc reply with unknown correlation_id dropped");
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<(), BusError> {
        self.publish_channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions {
                    durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn declare_queue(
        &self,
        name: &str,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        args: QueueArgs,
    ) -> Result<(), BusError> {
        self.publish_channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable,
                    exclusive,
                    auto_delete,
                    ..Default::default()
                },
                args.into_field_table(),
            )
            .await?;
        Ok(())
    }

    pub async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), BusError> {
        self.publish_channel
            .queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await?;
        Ok(())
    }

    /// Publishes a JSON body. Blocks on the publisher confirm so the call
    /// only returns after the broker has accepted (or returned) the message.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &T,
        opts: PublishOptions,
    ) -> Result<(), BusError> {
        let payload = serde_json::to_vec(body)?;

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(if opts.persistent { 2 } else { 1 });

        if let Some(message_id) = opts.message_id {
            properties = properties.with_message_id(message_id.into());
        }
        if let Some(correlation_id) = opts.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = opts.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }

        let confirm = self
            .publish_channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: opts.mandatory,
                    immediate: false,
                },
                &payload,
                properties,
            )
            .await?
            .await?;

        if confirm.is_nack() {
            tracing::warn!(exchange, routing_key, "publish nacked by broker");
        }

        Ok(())
    }

    /// Non-persistent publish of an RPC reply to the default exchange,
    /// addressed by `reply_to` (normally the Direct Reply-to pseudo-queue).
    pub async fn publish_rpc_response<T: Serialize>(
        &self,
        reply_to: &str,
        body: &T,
        correlation_id: &str,
    ) -> Result<(), BusError> {
        self.publish(
            "",
            reply_to,
            body,
            PublishOptions {
                correlation_id: Some(correlation_id.to_string()),
                persistent: false,
                mandatory: false,
                ..Default::default()
            },
        )
        .await
    }

    /// Issues an RPC call over Direct Reply-to. Mints a correlation id if
    /// none is supplied, registers a one-shot reply slot, publishes with
    /// `reply_to=amq.rabbitmq.reply-to`, and waits up to the configured
    /// timeout. The pending-replies map is always cleared, win or lose.
    pub async fn call_rpc<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &T,
        correlation_id: Option<String>,
    ) -> Result<Value, BusError> {
        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let (tx, rx) = oneshot::channel();
        self.pending_replies.insert(correlation_id.clone(), tx);

        let publish_result = self
            .publish(
                exchange,
                routing_key,
                payload,
                PublishOptions {
                    message_id: Some(Uuid::new_v4().to_string()),
                    correlation_id: Some(correlation_id.clone()),
                    reply_to: Some(DIRECT_REPLY_TO.to_string()),
                    persistent: true,
                    mandatory: true,
                },
            )
            .await;

        if let Err(e) = publish_result {
            self.pending_replies.remove(&correlation_id);
            return Err(e);
        }

        let result = timeout(self.rpc_timeout, rx).await;

        // Finally: the pending slot must not outlive this call either way.
        self.pending_replies.remove(&correlation_id);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BusError::RpcChannelClosed),
            Err(_) => Err(BusError::RpcTimeout(self.rpc_timeout)),
        }
    }

    /// Sets QoS (prefetch) on the consume channel and subscribes. Delivery
    /// is manual-ack; the listener framework owns ack/nack/reject decisions.
    pub async fn consume_raw(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<lapin::Consumer, BusError> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await?;
        let consumer = channel
            .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await?;
        Ok(consumer)
    }

    pub fn channel(&self) -> &Channel {
        &self.publish_channel
    }

    pub async fn close(&self) -> Result<(), BusError> {
        self.publish_channel.close(200, "bye").await?;
        self.consume_channel.close(200, "bye").await?;
        self.connection.close(200, "bye").await?;
        Ok(())
    }
}

pub fn retry_count_from_headers(headers: Option<&FieldTable>) -> u64 {
    let Some(headers) = headers else { return 0 };
    let Some(AMQPValue::FieldArray(deaths)) = headers.inner().get("x-death") else {
        return 0;
    };
    deaths
        .as_slice()
        .first()
        .and_then(|first| match first {
            AMQPValue::FieldTable(t) => t.inner().get("count").cloned(),
            _ => None,
        })
        .and_then(|count| match count {
            AMQPValue::LongLongInt(n) => Some(n as u64),
            AMQPValue::LongInt(n) => Some(n as u64),
            AMQPValue::ShortShortInt(n) => Some(n as u64),
            _ => None,
        })
        .unwrap_or(0)
}

pub fn delivery_meta(delivery: &lapin::message::Delivery) -> DeliveryMeta {
    DeliveryMeta {
        message_id: delivery.properties.message_id().as_ref().map(|s| s.to_string()),
        correlation_id: delivery.properties.correlation_id().as_ref().map(|s| s.to_string()),
        reply_to: delivery.properties.reply_to().as_ref().map(|s| s.to_string()),
        routing_key: delivery.routing_key.to_string(),
        retry_count: retry_count_from_headers(delivery.properties.headers().as_ref()),
    }
}
