//! In-memory dispatch queue.
//!
//! Keeps the broker semantics the pipeline relies on: FIFO delivery, manual
//! acknowledgment and redelivery of anything not acknowledged, including the
//! in-flight messages of a consumer that is dropped (crashes) before acking.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::errors::PipelineError;
use crate::queue::{AckHandle, Delivery, DispatchConsumer, DispatchPublisher};
use exif_indexer_shared::DispatchMessage;

#[derive(Debug, Clone)]
struct StoredMessage {
    offset: i64,
    key: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: BTreeMap<i64, StoredMessage>,
    next_offset: i64,
    acked: usize,
    deliveries: usize,
}

/// Shared in-memory queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct MemoryDispatchQueue {
    name: String,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    failing_publishes: Arc<AtomicUsize>,
}

impl MemoryDispatchQueue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            failing_publishes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a consumer on this queue.
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            queue: self.clone(),
            in_flight: HashSet::new(),
        }
    }

    /// Enqueue a raw payload, bypassing message encoding.
    pub fn push_raw(&self, key: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        let offset = state.next_offset;
        state.next_offset += 1;
        state.ready.push_back(StoredMessage {
            offset,
            key: key.into(),
            payload: payload.into(),
        });
        drop(state);
        self.notify.notify_one();
    }

    /// Reject the next `count` publishes as if the broker were down.
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Messages not yet acknowledged, whether delivered or not.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.unacked.len()
    }

    /// Number of acknowledged messages.
    pub fn acked(&self) -> usize {
        self.lock().acked
    }

    /// Number of deliveries, counting redeliveries.
    pub fn deliveries(&self) -> usize {
        self.lock().deliveries
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Put unacknowledged messages back at the head of the queue, oldest first.
    fn requeue(&self, offsets: impl IntoIterator<Item = i64>) {
        let mut state = self.lock();
        let mut returned: Vec<StoredMessage> = offsets
            .into_iter()
            .filter_map(|offset| state.unacked.remove(&offset))
            .collect();
        returned.sort_by_key(|m| m.offset);
        for message in returned.into_iter().rev() {
            state.ready.push_front(message);
        }
        drop(state);
        self.notify.notify_one();
    }
}

#[async_trait]
impl DispatchPublisher for MemoryDispatchQueue {
    async fn publish(&self, message: &DispatchMessage) -> Result<(), PipelineError> {
        if self.take_failure() {
            return Err(PipelineError::publish(&message.identifier, "queue unavailable"));
        }

        let payload = message
            .to_json()
            .map_err(|e| PipelineError::publish(&message.identifier, e.to_string()))?;
        self.push_raw(message.identifier.as_str(), payload);

        debug!(identifier = %message.identifier, queue = %self.name, "Published message");
        Ok(())
    }
}

/// Consumer over a [`MemoryDispatchQueue`].
///
/// Dropping the consumer returns its unacknowledged messages to the queue.
pub struct MemoryConsumer {
    queue: MemoryDispatchQueue,
    in_flight: HashSet<i64>,
}

impl MemoryConsumer {
    fn try_take(&mut self) -> Option<Delivery> {
        let mut state = self.queue.lock();
        let message = state.ready.pop_front()?;
        state.deliveries += 1;
        state.unacked.insert(message.offset, message.clone());
        drop(state);

        self.in_flight.insert(message.offset);
        Some(Delivery {
            key: Some(message.key),
            payload: message.payload,
            handle: AckHandle {
                topic: self.queue.name.clone(),
                partition: 0,
                offset: message.offset,
            },
        })
    }

    fn claim(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
        if handle.topic != self.queue.name || !self.in_flight.remove(&handle.offset) {
            return Err(PipelineError::ChannelError(format!(
                "Unknown delivery {}:{}",
                handle.topic, handle.offset
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchConsumer for MemoryConsumer {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, PipelineError>> {
        loop {
            let notify = Arc::clone(&self.queue.notify);
            let notified = notify.notified();
            if let Some(delivery) = self.try_take() {
                return Some(Ok(delivery));
            }
            notified.await;
        }
    }

    async fn ack(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
        self.claim(handle)?;
        let mut state = self.queue.lock();
        state.unacked.remove(&handle.offset);
        state.acked += 1;
        Ok(())
    }

    async fn release(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
        self.claim(handle)?;
        self.queue.requeue([handle.offset]);
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if !self.in_flight.is_empty() {
            let offsets: Vec<i64> = self.in_flight.drain().collect();
            self.queue.requeue(offsets);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif_indexer_shared::MetadataRecord;

    fn message(id: &str) -> DispatchMessage {
        DispatchMessage::new(id.into(), MetadataRecord::new())
    }

    async fn next(consumer: &mut MemoryConsumer) -> Delivery {
        consumer.next_delivery().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_fifo_delivery_and_ack() {
        let queue = MemoryDispatchQueue::new("test");
        queue.publish(&message("a.jpg")).await.unwrap();
        queue.publish(&message("b.jpg")).await.unwrap();

        let mut consumer = queue.consumer();
        let first = next(&mut consumer).await;
        let second = next(&mut consumer).await;
        assert_eq!(first.key.as_deref(), Some("a.jpg"));
        assert_eq!(second.key.as_deref(), Some("b.jpg"));

        consumer.ack(&first.handle).await.unwrap();
        consumer.ack(&second.handle).await.unwrap();
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.acked(), 2);
    }

    #[tokio::test]
    async fn test_release_redelivers_at_head() {
        let queue = MemoryDispatchQueue::new("test");
        queue.publish(&message("a.jpg")).await.unwrap();
        queue.publish(&message("b.jpg")).await.unwrap();

        let mut consumer = queue.consumer();
        let first = next(&mut consumer).await;
        consumer.release(&first.handle).await.unwrap();

        let again = next(&mut consumer).await;
        assert_eq!(again.key.as_deref(), Some("a.jpg"));
        assert_eq!(again.handle, first.handle);
        assert_eq!(queue.deliveries(), 2);
    }

    #[tokio::test]
    async fn test_dropped_consumer_returns_unacked_messages() {
        let queue = MemoryDispatchQueue::new("test");
        queue.publish(&message("a.jpg")).await.unwrap();

        {
            let mut consumer = queue.consumer();
            let _ = next(&mut consumer).await;
        }

        let mut consumer = queue.consumer();
        let redelivered = next(&mut consumer).await;
        assert_eq!(redelivered.key.as_deref(), Some("a.jpg"));
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_double_ack_is_rejected() {
        let queue = MemoryDispatchQueue::new("test");
        queue.publish(&message("a.jpg")).await.unwrap();

        let mut consumer = queue.consumer();
        let delivery = next(&mut consumer).await;
        consumer.ack(&delivery.handle).await.unwrap();
        assert!(consumer.ack(&delivery.handle).await.is_err());
    }

    #[tokio::test]
    async fn test_consumer_waits_for_publish() {
        let queue = MemoryDispatchQueue::new("test");
        let mut consumer = queue.consumer();

        let publisher = queue.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish(&message("late.jpg")).await.unwrap();
        });

        let delivery = next(&mut consumer).await;
        assert_eq!(delivery.key.as_deref(), Some("late.jpg"));
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let queue = MemoryDispatchQueue::new("test");
        queue.fail_next_publishes(1);

        let err = queue.publish(&message("a.jpg")).await.unwrap_err();
        assert!(matches!(err, PipelineError::PublishFailed { .. }));
        queue.publish(&message("a.jpg")).await.unwrap();
        assert_eq!(queue.pending(), 1);
    }
}
