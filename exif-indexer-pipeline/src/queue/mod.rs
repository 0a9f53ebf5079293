//! Dispatch queue module for the EXIF indexer pipeline.
//!
//! Decouples the producer pool from the index sink. Delivery is at-least-once:
//! a message leaves the queue only when the consumer acknowledges it, and a
//! released or unacknowledged message is delivered again.

mod kafka_queue;
mod memory_queue;

use async_trait::async_trait;

use crate::errors::PipelineError;
use exif_indexer_shared::DispatchMessage;

pub use kafka_queue::{KafkaConfig, KafkaConsumer, KafkaPublisher, DEFAULT_TOPIC};
pub use memory_queue::{MemoryConsumer, MemoryDispatchQueue};

/// Position of a delivered message, used to acknowledge or release it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckHandle {
    /// Queue (topic) the message was read from.
    pub topic: String,
    /// Partition within the queue.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// A message pulled from the queue and not yet acknowledged.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Message key, the identifier for messages published by this pipeline.
    pub key: Option<String>,
    /// Encoded [`DispatchMessage`].
    pub payload: Vec<u8>,
    /// Handle to acknowledge or release the message with.
    pub handle: AckHandle,
}

/// Publishing side of the dispatch queue. Shared by all producer tasks.
#[async_trait]
pub trait DispatchPublisher: Send + Sync {
    /// Durably enqueue one message.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Once the broker confirmed the message
    /// * `Err(PipelineError::PublishFailed)` - If the broker could not be reached
    async fn publish(&self, message: &DispatchMessage) -> Result<(), PipelineError>;
}

/// Consuming side of the dispatch queue. Owned by a single consumer task.
#[async_trait]
pub trait DispatchConsumer: Send {
    /// Pull the next message, waiting until one is available.
    ///
    /// Returns `None` only if the underlying stream has ended.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, PipelineError>>;

    /// Mark a message as durably processed.
    async fn ack(&mut self, handle: &AckHandle) -> Result<(), PipelineError>;

    /// Give a message back without acknowledging it, so it is delivered again.
    async fn release(&mut self, handle: &AckHandle) -> Result<(), PipelineError>;
}
