//! Kafka-backed dispatch queue.
//!
//! Producers publish JSON envelopes keyed by identifier. The consumer reads
//! with auto-commit disabled: acknowledging commits the next offset, releasing
//! seeks the partition back so the message is read again.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message as KafkaMessage,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
    Offset, TopicPartitionList,
};
use tracing::{debug, info, instrument};

use crate::errors::PipelineError;
use crate::queue::{AckHandle, Delivery, DispatchConsumer, DispatchPublisher};
use exif_indexer_shared::DispatchMessage;

/// The Kafka topic metadata records are dispatched on.
pub const DEFAULT_TOPIC: &str = "exif.metadata";

/// Connection settings shared by the publisher and the consumer.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Broker addresses (comma-separated `host:port`).
    pub brokers: String,
    /// Topic used as the dispatch queue.
    pub topic: String,
    /// Consumer group ID.
    pub group_id: String,
    /// SASL/PLAIN username.
    pub username: Option<String>,
    /// SASL/PLAIN password.
    pub password: Option<String>,
    /// How long a publish may wait for broker confirmation.
    pub publish_timeout: Duration,
}

impl KafkaConfig {
    /// Create a config without credentials.
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
            username: None,
            password: None,
            publish_timeout: Duration::from_secs(5),
        }
    }

    /// Authenticate with SASL/PLAIN.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        config
    }
}

/// Process-wide publisher. `FutureProducer` is internally pooled and safe to
/// share between producer tasks.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPublisher {
    /// Create a new Kafka publisher.
    pub fn new(config: &KafkaConfig) -> Result<Self, PipelineError> {
        let producer: FutureProducer = config
            .client_config()
            .set("acks", "all")
            .set("compression.type", "zstd")
            .set("message.timeout.ms", config.publish_timeout.as_millis().to_string())
            .create()
            .map_err(|e| PipelineError::broker(format!("Failed to create Kafka producer: {}", e)))?;

        info!(brokers = %config.brokers, topic = %config.topic, "Created Kafka publisher");

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: config.publish_timeout,
        })
    }
}

#[async_trait]
impl DispatchPublisher for KafkaPublisher {
    async fn publish(&self, message: &DispatchMessage) -> Result<(), PipelineError> {
        let payload = message
            .to_json()
            .map_err(|e| PipelineError::publish(&message.identifier, e.to_string()))?;

        let record = FutureRecord::to(&self.topic)
            .key(message.identifier.as_str())
            .payload(&payload);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                debug!(
                    identifier = %message.identifier,
                    partition = partition,
                    offset = offset,
                    "Published message"
                );
                Ok(())
            }
            Err((e, _)) => Err(PipelineError::publish(&message.identifier, e.to_string())),
        }
    }
}

/// Kafka consumer for dispatch messages.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer with manual acknowledgment.
    pub fn new(config: &KafkaConfig) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = config
            .client_config()
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| PipelineError::broker(format!("Failed to create Kafka consumer: {}", e)))?;

        info!(brokers = %config.brokers, group_id = %config.group_id, "Created Kafka consumer");

        Ok(Self {
            consumer,
            topics: vec![config.topic.clone()],
        })
    }

    /// Subscribe to configured topics.
    pub fn subscribe(&self) -> Result<(), PipelineError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer.subscribe(&topics)?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }
}

#[async_trait]
impl DispatchConsumer for KafkaConsumer {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, PipelineError>> {
        let delivery = self.consumer.recv().await.map(|msg| {
            debug!(
                topic = %msg.topic(),
                partition = msg.partition(),
                offset = msg.offset(),
                "Received message"
            );
            Delivery {
                key: msg
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                handle: AckHandle {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                },
            }
        });

        Some(delivery.map_err(PipelineError::from))
    }

    #[instrument(skip(self))]
    async fn ack(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&handle.topic, handle.partition, Offset::Offset(handle.offset + 1))?;

        self.consumer.commit(&tpl, CommitMode::Async)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn release(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
        self.consumer.seek(
            &handle.topic,
            handle.partition,
            Offset::Offset(handle.offset),
            Duration::from_secs(5),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_without_credentials() {
        let config = KafkaConfig::new("localhost:9092", DEFAULT_TOPIC, "exif-indexer");
        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("security.protocol"), None);
    }

    #[test]
    fn test_client_config_with_credentials() {
        let config = KafkaConfig::new("broker:9093", DEFAULT_TOPIC, "exif-indexer")
            .with_credentials("indexer", "secret");
        let client = config.client_config();
        assert_eq!(client.get("security.protocol"), Some("SASL_PLAINTEXT"));
        assert_eq!(client.get("sasl.mechanisms"), Some("PLAIN"));
        assert_eq!(client.get("sasl.username"), Some("indexer"));
    }
}
