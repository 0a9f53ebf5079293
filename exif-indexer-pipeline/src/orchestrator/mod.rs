//! Orchestrator module for the EXIF indexer pipeline.
//!
//! Coordinates the catalog, the producer pool and the index sink.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::catalog::CatalogLister;
use crate::errors::PipelineError;
use crate::fetcher::ObjectFetcher;
use crate::producer::{ProducerConfig, ProducerPool, ProducerReport};
use crate::queue::{DispatchConsumer, DispatchPublisher};
use crate::sink::{IndexSink, SinkConfig, SinkReport, SinkState};
use exif_indexer_repository::SearchEngineClient;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Producer pool settings.
    pub producer: ProducerConfig,
    /// Index sink settings.
    pub sink: SinkConfig,
}

/// Summary of one harvest run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifiers returned by the catalog.
    pub identifiers: usize,
    /// Producer pool outcome.
    pub producers: ProducerReport,
    /// Index sink outcome.
    pub sink: SinkReport,
    /// Set when the sink stopped with an error, e.g. the cluster never became ready.
    pub sink_error: Option<String>,
    /// Whether the run was cut short by shutdown.
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Wall-clock duration of the run.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Orchestrator that coordinates the pipeline components.
///
/// The orchestrator:
/// - Lists the catalog and fails the run if that is impossible
/// - Runs the producer pool to completion
/// - Starts the index sink once every producer finished
/// - Handles shutdown requests
pub struct Orchestrator {
    catalog: Arc<dyn CatalogLister>,
    producers: ProducerPool,
    sink: IndexSink,
    consumer: Box<dyn DispatchConsumer>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create a new orchestrator from explicit component handles.
    pub fn new(
        catalog: Arc<dyn CatalogLister>,
        fetcher: Arc<dyn ObjectFetcher>,
        publisher: Arc<dyn DispatchPublisher>,
        consumer: Box<dyn DispatchConsumer>,
        search: Arc<dyn SearchEngineClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            producers: ProducerPool::new(fetcher, publisher, config.producer),
            sink: IndexSink::new(search, config.sink),
            consumer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run one harvest.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - On completion or graceful shutdown
    /// * `Err(PipelineError::CatalogUnavailable)` - If the catalog could not be listed
    /// * `Err(PipelineError::Cancelled)` - If shutdown was requested while listing
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        info!("Starting EXIF indexer orchestrator");

        let identifiers = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(PipelineError::Cancelled),
            listed = self.catalog.list_identifiers() => listed?,
        };
        let listed = identifiers.len();
        info!(identifiers = listed, "Catalog listed");

        let producers = self
            .producers
            .run(identifiers, self.shutdown.child_token())
            .await;

        let (sink, sink_error) = match self
            .sink
            .run(self.consumer.as_mut(), self.shutdown.child_token())
            .await
        {
            Ok(report) => (report, None),
            Err(e) => {
                error!(error = %e, "Index sink stopped with an error");
                (SinkReport::default(), Some(e.to_string()))
            }
        };

        let report = RunReport {
            identifiers: listed,
            producers,
            sink,
            sink_error,
            interrupted: self.shutdown.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            identifiers = report.identifiers,
            published = report.producers.published,
            indexed = report.sink.indexed,
            interrupted = report.interrupted,
            duration_ms = report.duration().num_milliseconds(),
            "Orchestrator run complete"
        );
        Ok(report)
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that triggers a graceful shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current state of the index sink.
    pub fn sink_state(&self) -> SinkState {
        self.sink.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryDispatchQueue;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use exif_indexer_repository::MemorySearchClient;
    use exif_indexer_shared::{ObjectIdentifier, RawObject};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticCatalog(Option<Vec<&'static str>>);

    #[async_trait]
    impl CatalogLister for StaticCatalog {
        async fn list_identifiers(&self) -> Result<Vec<ObjectIdentifier>, PipelineError> {
            match &self.0 {
                Some(ids) => Ok(ids.iter().map(|id| ObjectIdentifier::from(*id)).collect()),
                None => Err(PipelineError::catalog("listing failed after 10 attempts")),
            }
        }
    }

    #[derive(Default)]
    struct EmptyFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectFetcher for EmptyFetcher {
        async fn fetch(&self, identifier: &ObjectIdentifier) -> Result<RawObject, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawObject::new(identifier.clone(), Vec::new()))
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            producer: ProducerConfig {
                concurrency: 2,
                publish_retry: RetryPolicy::exponential(2, Duration::from_millis(10), Duration::from_millis(10)),
                shutdown_grace: Duration::from_secs(1),
            },
            sink: SinkConfig {
                health_poll: RetryPolicy::fixed(Duration::from_secs(1), None),
                idle_timeout: Some(Duration::from_secs(5)),
                write_backoff: RetryPolicy::exponential(u32::MAX, Duration::from_millis(100), Duration::from_secs(1)),
            },
        }
    }

    fn orchestrator(
        catalog: StaticCatalog,
        fetcher: Arc<EmptyFetcher>,
        search: Arc<MemorySearchClient>,
    ) -> (Orchestrator, MemoryDispatchQueue) {
        let queue = MemoryDispatchQueue::new("test");
        let orchestrator = Orchestrator::new(
            Arc::new(catalog),
            fetcher,
            Arc::new(queue.clone()),
            Box::new(queue.consumer()),
            search,
            config(),
        );
        (orchestrator, queue)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_indexes_every_identifier() {
        let search = Arc::new(MemorySearchClient::new());
        let (mut orchestrator, queue) = orchestrator(
            StaticCatalog(Some(vec!["a.jpg", "b.jpg", "c.jpg"])),
            Arc::new(EmptyFetcher::default()),
            search.clone(),
        );

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.identifiers, 3);
        assert_eq!(report.producers.published, 3);
        assert_eq!(report.sink.indexed, 3);
        assert!(!report.interrupted);
        assert!(report.finished_at >= report.started_at);
        assert_eq!(search.document_count().await, 3);
        assert_eq!(queue.pending(), 0);
        assert_eq!(orchestrator.sink_state(), SinkState::Consuming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_failure_is_fatal() {
        let fetcher = Arc::new(EmptyFetcher::default());
        let search = Arc::new(MemorySearchClient::new());
        let (mut orchestrator, _queue) = orchestrator(StaticCatalog(None), fetcher.clone(), search.clone());

        let err = orchestrator.run().await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(search.health_checks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_run() {
        let fetcher = Arc::new(EmptyFetcher::default());
        let (mut orchestrator, _queue) = orchestrator(
            StaticCatalog(Some(vec!["a.jpg"])),
            fetcher.clone(),
            Arc::new(MemorySearchClient::new()),
        );

        orchestrator.shutdown();
        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(orchestrator.shutdown_token().is_cancelled());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_fail_run() {
        let search = Arc::new(MemorySearchClient::with_health_sequence([
            exif_indexer_repository::ClusterHealth::Red,
        ]));
        let queue = MemoryDispatchQueue::new("test");
        let mut cfg = config();
        cfg.sink.health_poll = RetryPolicy::fixed(Duration::from_secs(1), Some(2));
        let mut orchestrator = Orchestrator::new(
            Arc::new(StaticCatalog(Some(vec!["a.jpg"]))),
            Arc::new(EmptyFetcher::default()),
            Arc::new(queue.clone()),
            Box::new(queue.consumer()),
            search.clone(),
            cfg,
        );

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.producers.published, 1);
        assert!(report.sink_error.is_some());
        assert_eq!(search.write_count(), 0);
        assert_eq!(queue.pending(), 1);
    }
}
