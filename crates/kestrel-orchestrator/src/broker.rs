//! Message broker boundary and its AMQP implementation.

use crate::config::BrokerConfig;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info, warn};

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// A job message pulled from the job queue, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

/// The subset of broker operations the worker relies on.
///
/// Every error is a [`TransportError`] and stops the worker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Next pending job, or `None` when the job queue is empty.
    async fn next_delivery(&self) -> TransportResult<Option<Delivery>>;

    /// Publish a persistent message and wait for the broker's confirmation.
    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        correlation_id: Option<&str>,
    ) -> TransportResult<()>;

    async fn ack(&self, delivery_tag: u64) -> TransportResult<()>;
}

fn publish_error(queue: &str, reason: String) -> TransportError {
    TransportError::Publish {
        queue: queue.to_string(),
        reason,
    }
}

fn owned(value: Option<&ShortString>) -> Option<String> {
    value.map(|s| s.as_str().to_string())
}

/// RabbitMQ broker over a single confirm-mode channel.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    job_queue: String,
}

impl AmqpBroker {
    pub async fn connect(config: &BrokerConfig) -> TransportResult<Self> {
        let properties =
            ConnectionProperties::default().with_connection_name("kestrel-worker".into());
        let connection = Connection::connect(&config.url, properties)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connection(format!("channel creation failed: {e}")))?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| TransportError::Connection(format!("failed to set QoS: {e}")))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                TransportError::Connection(format!("failed to enable publisher confirms: {e}"))
            })?;

        let broker = Self {
            connection,
            channel,
            job_queue: config.job_queue.clone(),
        };
        broker.declare_queue(&config.job_queue).await?;
        broker.declare_queue(&config.response_queue).await?;

        info!(
            job_queue = %config.job_queue,
            response_queue = %config.response_queue,
            "Connected to broker"
        );
        Ok(broker)
    }

    async fn declare_queue(&self, queue: &str) -> TransportResult<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map_err(|e| TransportError::QueueDeclare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        debug!(queue, "Queue declared");
        Ok(())
    }

    /// Close the channel and the connection. Errors are only logged.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "worker shutdown").await {
            warn!(error = %e, "Failed to close broker channel");
        }
        if let Err(e) = self.connection.close(200, "worker shutdown").await {
            warn!(error = %e, "Failed to close broker connection");
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn next_delivery(&self) -> TransportResult<Option<Delivery>> {
        let message = self
            .channel
            .basic_get(&self.job_queue, BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| TransportError::Consume {
                queue: self.job_queue.clone(),
                reason: e.to_string(),
            })?;

        Ok(message.map(|message| {
            let delivery = message.delivery;
            let properties = &delivery.properties;
            Delivery {
                correlation_id: owned(properties.correlation_id().as_ref()),
                reply_to: owned(properties.reply_to().as_ref()),
                delivery_tag: delivery.delivery_tag,
                body: delivery.data,
            }
        }))
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        correlation_id: Option<&str>,
    ) -> TransportResult<()> {
        let mut properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());
        if let Some(correlation_id) = correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }

        let options = BasicPublishOptions::default();
        let confirmation = self
            .channel
            .basic_publish("", queue, options, payload, properties)
            .await
            .map_err(|e| publish_error(queue, e.to_string()))?
            .await
            .map_err(|e| publish_error(queue, format!("confirmation failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(publish_error(queue, "broker rejected the message".to_string()));
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> TransportResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| TransportError::Ack {
                delivery_tag,
                reason: e.to_string(),
            })
    }
}
