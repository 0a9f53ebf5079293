//! Index sink for the EXIF indexer pipeline.
//!
//! A single sequential consumer. It waits until the search cluster reports a
//! usable health level, then writes one document per queue message and acks
//! the message only after the write succeeded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use crate::queue::{AckHandle, Delivery, DispatchConsumer};
use crate::retry::{retry, RetryPolicy};
use exif_indexer_repository::{SearchEngineClient, SearchError};
use exif_indexer_shared::{DispatchMessage, ExifDocument};

/// Lifecycle of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Polling cluster health; nothing is written.
    NotReady,
    /// The cluster is usable; preparing the index.
    Ready,
    /// Draining the dispatch queue.
    Consuming,
}

/// Configuration for the index sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Health polling schedule while not ready.
    pub health_poll: RetryPolicy,
    /// Finish once no message arrived for this long. `None` consumes until shutdown.
    pub idle_timeout: Option<Duration>,
    /// Delay schedule after consecutive failed writes.
    pub write_backoff: RetryPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            health_poll: RetryPolicy::fixed(Duration::from_secs(5), None),
            idle_timeout: Some(Duration::from_secs(30)),
            write_backoff: RetryPolicy::exponential(u32::MAX, Duration::from_millis(500), Duration::from_secs(30)),
        }
    }
}

/// Outcome of a sink run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Messages written and acknowledged.
    pub indexed: usize,
    /// Failed writes; each released its message for redelivery.
    pub failed_writes: usize,
    /// Undecodable messages, acknowledged and dropped.
    pub poison: usize,
}

enum Pull {
    Message(Delivery),
    Failed(PipelineError),
    Idle,
    Ended,
}

/// Readiness-gated consumer writing queue messages into the search index.
pub struct IndexSink {
    client: Arc<dyn SearchEngineClient>,
    config: SinkConfig,
    state: watch::Sender<SinkState>,
}

impl IndexSink {
    /// Create a new sink in the `NotReady` state.
    pub fn new(client: Arc<dyn SearchEngineClient>, config: SinkConfig) -> Self {
        let (state, _) = watch::channel(SinkState::NotReady);
        Self {
            client,
            config,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SinkState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SinkState> {
        self.state.subscribe()
    }

    /// Wait for readiness, then consume until idle, end of stream or shutdown.
    ///
    /// # Returns
    ///
    /// * `Ok(SinkReport)` - On idle completion, end of stream or shutdown
    /// * `Err(PipelineError::BrokerUnavailable)` - If the cluster never became
    ///   ready within the health polling budget, or a message could not be
    ///   released after a failed write
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        consumer: &mut dyn DispatchConsumer,
        cancel: CancellationToken,
    ) -> Result<SinkReport, PipelineError> {
        let mut report = SinkReport::default();

        if !self.wait_until_ready(&cancel).await? {
            info!("Shutdown requested before the cluster became ready");
            return Ok(report);
        }
        self.state.send_replace(SinkState::Ready);

        if let Err(e) = self.client.ensure_index_exists().await {
            warn!(error = %e, "Could not prepare index, writes will rely on defaults");
        }

        self.state.send_replace(SinkState::Consuming);
        info!("Index sink consuming");

        let mut consecutive_failures = 0u32;
        loop {
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping index sink");
                    break;
                }
                pulled = self.pull(consumer) => pulled,
            };

            let delivery = match pulled {
                Pull::Message(delivery) => delivery,
                Pull::Idle => {
                    info!("Dispatch queue idle, index sink finished");
                    break;
                }
                Pull::Ended => {
                    info!("Dispatch queue stream ended");
                    break;
                }
                Pull::Failed(e) => {
                    warn!(error = %e, "Failed to receive message");
                    if !self.pause(&cancel, consecutive_failures).await {
                        break;
                    }
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    continue;
                }
            };

            let handle = delivery.handle.clone();
            let message = match DispatchMessage::from_json(&delivery.payload) {
                Ok(message) => message,
                Err(e) => {
                    error!(
                        key = ?delivery.key,
                        offset = handle.offset,
                        error = %e,
                        "Dropping undecodable message"
                    );
                    self.acknowledge(consumer, &handle).await;
                    report.poison += 1;
                    continue;
                }
            };

            let document = ExifDocument::from(message);
            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                written = self.client.index_document(&document) => Some(written),
            };

            match written {
                None => {
                    warn!(identifier = %document.identifier, "Shutdown during write, releasing message");
                    self.release(consumer, &handle).await?;
                    break;
                }
                Some(Ok(())) => {
                    debug!(identifier = %document.identifier, "Indexed document");
                    self.acknowledge(consumer, &handle).await;
                    report.indexed += 1;
                    consecutive_failures = 0;
                }
                Some(Err(e)) => {
                    let e = PipelineError::index_write(&document.identifier, e);
                    warn!(identifier = %document.identifier, error = %e, "Index write failed, releasing message");
                    self.release(consumer, &handle).await?;
                    report.failed_writes += 1;

                    if !self.pause(&cancel, consecutive_failures).await {
                        break;
                    }
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }
        }

        info!(
            indexed = report.indexed,
            failed_writes = report.failed_writes,
            poison = report.poison,
            "Index sink stopped"
        );
        Ok(report)
    }

    /// Poll cluster health until it is usable.
    ///
    /// Returns `Ok(false)` if shutdown was requested first.
    async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<bool, PipelineError> {
        self.state.send_replace(SinkState::NotReady);
        info!("Waiting for search cluster");

        let health_poll = retry(
            &self.config.health_poll,
            |_| {
                let client = Arc::clone(&self.client);
                async move {
                    let health = client.cluster_health().await?;
                    if health.is_ready() {
                        Ok::<_, SearchError>(health)
                    } else {
                        Err(SearchError::health(format!("cluster health is {health}")))
                    }
                }
            },
            |_| true,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            result = health_poll => match result {
                Ok(health) => {
                    info!(health = %health, "Search cluster ready");
                    Ok(true)
                }
                Err(e) => Err(PipelineError::broker(format!(
                    "Search cluster not ready: {e}"
                ))),
            },
        }
    }

    async fn pull(&self, consumer: &mut dyn DispatchConsumer) -> Pull {
        let next = match self.config.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, consumer.next_delivery()).await {
                Ok(next) => next,
                Err(_) => return Pull::Idle,
            },
            None => consumer.next_delivery().await,
        };

        match next {
            Some(Ok(delivery)) => Pull::Message(delivery),
            Some(Err(e)) => Pull::Failed(e),
            None => Pull::Ended,
        }
    }

    /// Back off after a failure. Returns `false` if shutdown interrupted the wait.
    async fn pause(&self, cancel: &CancellationToken, failures: u32) -> bool {
        let delay = self.config.write_backoff.delay_for(failures);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn acknowledge(&self, consumer: &mut dyn DispatchConsumer, handle: &AckHandle) {
        if let Err(e) = consumer.ack(handle).await {
            // The message will be delivered again and overwrite the same document.
            warn!(offset = handle.offset, error = %e, "Failed to acknowledge message");
        }
    }

    /// Offsets are committed cumulatively, so a message that was not released
    /// would be skipped by the next ack. The consume loop stops instead and the
    /// consumer resumes from the last committed offset.
    async fn release(
        &self,
        consumer: &mut dyn DispatchConsumer,
        handle: &AckHandle,
    ) -> Result<(), PipelineError> {
        consumer.release(handle).await.map_err(|e| {
            error!(offset = handle.offset, error = %e, "Failed to release message, stopping index sink");
            PipelineError::broker(format!(
                "Failed to release message at {}:{}: {}",
                handle.topic, handle.offset, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{DispatchPublisher, MemoryConsumer, MemoryDispatchQueue};
    use async_trait::async_trait;
    use exif_indexer_repository::{ClusterHealth, MemorySearchClient};
    use exif_indexer_shared::MetadataRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> SinkConfig {
        SinkConfig {
            health_poll: RetryPolicy::fixed(Duration::from_secs(5), None),
            idle_timeout: Some(Duration::from_secs(10)),
            write_backoff: RetryPolicy::exponential(u32::MAX, Duration::from_millis(100), Duration::from_secs(1)),
        }
    }

    async fn queue_with(ids: &[&str]) -> MemoryDispatchQueue {
        let queue = MemoryDispatchQueue::new("test");
        for id in ids {
            let record: MetadataRecord = [("Make", "Acme")].into_iter().collect();
            queue
                .publish(&DispatchMessage::new((*id).into(), record))
                .await
                .unwrap();
        }
        queue
    }

    /// Memory consumer with scripted receive and release failures.
    struct ScriptedConsumer {
        inner: MemoryConsumer,
        failing_pulls: usize,
        fail_releases: bool,
        acked: Vec<AckHandle>,
    }

    impl ScriptedConsumer {
        fn new(inner: MemoryConsumer) -> Self {
            Self {
                inner,
                failing_pulls: 0,
                fail_releases: false,
                acked: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl DispatchConsumer for ScriptedConsumer {
        async fn next_delivery(&mut self) -> Option<Result<Delivery, PipelineError>> {
            if self.failing_pulls > 0 {
                self.failing_pulls -= 1;
                return Some(Err(PipelineError::broker("broker transport failure")));
            }
            self.inner.next_delivery().await
        }

        async fn ack(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
            self.acked.push(handle.clone());
            self.inner.ack(handle).await
        }

        async fn release(&mut self, handle: &AckHandle) -> Result<(), PipelineError> {
            if self.fail_releases {
                return Err(PipelineError::broker("seek failed"));
            }
            self.inner.release(handle).await
        }
    }

    /// Client whose writes never complete before shutdown.
    struct StalledClient {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SearchEngineClient for StalledClient {
        async fn cluster_health(&self) -> Result<ClusterHealth, SearchError> {
            Ok(ClusterHealth::Green)
        }

        async fn index_document(&self, _document: &ExifDocument) -> Result<(), SearchError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn ensure_index_exists(&self) -> Result<(), SearchError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_indexes_and_acks_until_idle() {
        let client = Arc::new(MemorySearchClient::new());
        let queue = queue_with(&["a.jpg", "b.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());

        let report = sink
            .run(&mut queue.consumer(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(queue.acked(), 2);
        assert_eq!(queue.pending(), 0);
        assert_eq!(client.document_count().await, 2);
        assert!(client.index_created());
        assert_eq!(sink.state(), SinkState::Consuming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_while_cluster_red() {
        let client = Arc::new(MemorySearchClient::with_health_sequence([
            ClusterHealth::Red,
            ClusterHealth::Red,
            ClusterHealth::Yellow,
        ]));
        let queue = queue_with(&["a.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());

        let report = sink
            .run(&mut queue.consumer(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(client.health_checks(), 3);
        assert_eq!(client.writes_while_unhealthy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_when_health_budget_exhausted() {
        let client = Arc::new(MemorySearchClient::with_health_sequence([ClusterHealth::Red]));
        let queue = queue_with(&["a.jpg"]).await;
        let mut cfg = config();
        cfg.health_poll = RetryPolicy::fixed(Duration::from_secs(1), Some(3));
        let sink = IndexSink::new(client.clone(), cfg);

        let err = sink
            .run(&mut queue.consumer(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::BrokerUnavailable(_)));
        assert_eq!(client.health_checks(), 3);
        assert_eq!(client.write_count(), 0);
        assert_eq!(sink.state(), SinkState::NotReady);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_not_ready() {
        let client = Arc::new(MemorySearchClient::with_health_sequence([ClusterHealth::Red]));
        let queue = queue_with(&["a.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.cancel();
        });

        let report = sink.run(&mut queue.consumer(), cancel).await.unwrap();

        assert_eq!(report, SinkReport::default());
        assert_eq!(client.write_count(), 0);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_released_and_retried() {
        let client = Arc::new(MemorySearchClient::new());
        client.fail_next_writes(2);
        let queue = queue_with(&["a.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());

        let report = sink
            .run(&mut queue.consumer(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed_writes, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(queue.deliveries(), 3);
        assert_eq!(queue.acked(), 1);
        assert!(client.document("a.jpg").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_message_is_acked() {
        let client = Arc::new(MemorySearchClient::new());
        let queue = queue_with(&["a.jpg"]).await;
        queue.push_raw("broken", b"not json".to_vec());
        let sink = IndexSink::new(client.clone(), config());

        let report = sink
            .run(&mut queue.consumer(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.poison, 1);
        assert_eq!(report.indexed, 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_write_does_not_ack() {
        let client = Arc::new(StalledClient {
            writes: AtomicUsize::new(0),
        });
        let queue = queue_with(&["a.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let report = sink.run(&mut queue.consumer(), cancel).await.unwrap();

        assert_eq!(client.writes.load(Ordering::SeqCst), 1);
        assert_eq!(report.indexed, 0);
        assert_eq!(queue.acked(), 0);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_idle_timeout_runs_until_shutdown() {
        let client = Arc::new(MemorySearchClient::new());
        let queue = queue_with(&["a.jpg"]).await;
        let mut cfg = config();
        cfg.idle_timeout = None;
        let sink = IndexSink::new(client.clone(), cfg);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(600)).await;
            trigger.cancel();
        });

        let report = sink.run(&mut queue.consumer(), cancel).await.unwrap();
        assert_eq!(report.indexed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_release_stops_before_later_ack() {
        let client = Arc::new(MemorySearchClient::new());
        client.fail_next_writes(1);
        let queue = queue_with(&["a.jpg", "b.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());
        let mut consumer = ScriptedConsumer::new(queue.consumer());
        consumer.fail_releases = true;

        let err = sink
            .run(&mut consumer, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::BrokerUnavailable(_)));
        assert!(consumer.acked.is_empty());
        assert_eq!(queue.acked(), 0);
        assert!(client.document("b.jpg").await.is_none());

        drop(consumer);
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_failures_back_off() {
        let client = Arc::new(MemorySearchClient::new());
        let queue = queue_with(&["a.jpg"]).await;
        let sink = IndexSink::new(client.clone(), config());
        let mut consumer = ScriptedConsumer::new(queue.consumer());
        consumer.failing_pulls = 3;
        let start = tokio::time::Instant::now();

        let report = sink
            .run(&mut consumer, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.indexed, 1);
        // 100ms + 200ms + 400ms of backoff, then the 10s idle timeout
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10_700));
        assert!(elapsed < Duration::from_millis(10_800));
    }
}
