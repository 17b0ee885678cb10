//! Queue-publish adapter (RabbitMQ).
//!
//! Log entries are published as JSON to a durable topic exchange. Success
//! means the broker confirmed the publish on the channel; whether the
//! downstream consumer ever processes the entry is not observed. Delivery
//! intent is at-least-once with no confirmation beyond the channel ack.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, warn};

use super::{LogSink, TransportKind};
use crate::config::AmqpConfig;
use crate::envelope::JsonResponse;
use crate::error::{BrokerError, Result, TransportFailure};
use crate::payload::LogPayload;

/// AMQP reply code for a normal channel close.
const REPLY_SUCCESS: u16 = 200;

/// Publishes log entries to a RabbitMQ topic exchange.
///
/// Connections come from an injected pool; each publish opens its own
/// channel and closes it afterwards.
pub struct QueueLogSink {
    pool: Pool,
    exchange: String,
    routing_key: String,
    deadline: Duration,
}

impl QueueLogSink {
    /// Build a sink with its own connection pool. No connection is opened
    /// until the first publish (or [`QueueLogSink::verify_connection`]).
    pub fn new(config: &AmqpConfig, deadline: Duration) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(config.pool_size.max(1))
            .build()
            .map_err(|e| {
                BrokerError::transport(
                    TransportKind::Queue,
                    TransportFailure::Connect(format!("Failed to create pool: {}", e)),
                )
            })?;

        Ok(Self::with_pool(
            pool,
            config.exchange.clone(),
            config.routing_key.clone(),
            deadline,
        ))
    }

    /// Build a sink around an existing pool.
    pub fn with_pool(
        pool: Pool,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            pool,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            deadline,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Check out a pooled connection, opening one if needed.
    pub async fn verify_connection(&self) -> Result<()> {
        let failure = match tokio::time::timeout(self.deadline, self.pool.get()).await {
            Ok(Ok(_)) => return Ok(()),
            Ok(Err(e)) => pool_failure(e),
            Err(_) => TransportFailure::DeadlineExceeded(self.deadline),
        };
        Err(BrokerError::transport(TransportKind::Queue, failure))
    }

    async fn publish(&self, body: &[u8]) -> std::result::Result<(), TransportFailure> {
        let conn = self.pool.get().await.map_err(pool_failure)?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| TransportFailure::Connect(format!("Failed to create channel: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| TransportFailure::Io(format!("Failed to enable confirms: {}", e)))?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportFailure::Io(format!("Failed to declare exchange: {}", e)))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        let confirmation = channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| TransportFailure::Io(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| TransportFailure::Io(format!("Publish confirmation failed: {}", e)))?;

        if let Err(e) = channel.close(REPLY_SUCCESS, "publish complete").await {
            debug!(error = %e, "Channel close failed");
        }

        if confirmation.is_nack() {
            return Err(TransportFailure::Protocol(
                "broker refused the publish".to_string(),
            ));
        }
        Ok(())
    }
}

fn pool_failure(e: PoolError) -> TransportFailure {
    TransportFailure::Connect(format!("Failed to get connection from pool: {}", e))
}

#[async_trait]
impl LogSink for QueueLogSink {
    fn transport(&self) -> TransportKind {
        TransportKind::Queue
    }

    #[tracing::instrument(
        name = "adapter.queue",
        skip_all,
        fields(exchange = %self.exchange, routing_key = %self.routing_key)
    )]
    async fn write_log(&self, entry: &LogPayload) -> Result<JsonResponse> {
        let body = serde_json::to_vec(entry).map_err(|e| {
            BrokerError::transport(TransportKind::Queue, TransportFailure::Encode(e.to_string()))
        })?;

        let outcome = match tokio::time::timeout(self.deadline, self.publish(&body)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportFailure::DeadlineExceeded(self.deadline)),
        };

        match outcome {
            Ok(()) => {
                debug!(name = %entry.name, "Published log entry");
                Ok(JsonResponse::success("Logged via RabbitMQ"))
            }
            Err(failure) => {
                warn!(error = %failure, "Queue publish failed");
                Err(BrokerError::transport(TransportKind::Queue, failure))
            }
        }
    }
}
