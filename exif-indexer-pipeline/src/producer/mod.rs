//! Producer pool for the EXIF indexer pipeline.
//!
//! A bounded set of workers pulls identifiers from a shared work queue. Each
//! identifier goes through fetch, extract and publish exactly once; failures
//! are logged with the identifier and never stop the other workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use crate::extractor::ExifExtractor;
use crate::fetcher::ObjectFetcher;
use crate::queue::DispatchPublisher;
use crate::retry::{retry, RetryPolicy};
use exif_indexer_shared::{DispatchMessage, ObjectIdentifier};

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Configuration for the producer pool.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Number of workers. `0` starts one worker per identifier.
    pub concurrency: usize,
    /// Retry policy for publishing a message before it is dropped.
    pub publish_retry: RetryPolicy,
    /// How long in-flight work may continue after shutdown was requested.
    pub shutdown_grace: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            publish_retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Outcome of a producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Identifiers a worker started on.
    pub attempted: usize,
    /// Identifiers whose message reached the queue.
    pub published: usize,
    /// Identifiers dropped because the object could not be fetched.
    pub fetch_failed: usize,
    /// Identifiers dropped because publishing kept failing.
    pub publish_failed: usize,
    /// Published identifiers whose record lost information during extraction.
    pub degraded: usize,
    /// Identifiers never finished because of shutdown.
    pub abandoned: usize,
}

#[derive(Default)]
struct Counters {
    attempted: AtomicUsize,
    published: AtomicUsize,
    fetch_failed: AtomicUsize,
    publish_failed: AtomicUsize,
    degraded: AtomicUsize,
}

impl Counters {
    fn report(&self, total: usize) -> ProducerReport {
        let published = self.published.load(Ordering::SeqCst);
        let fetch_failed = self.fetch_failed.load(Ordering::SeqCst);
        let publish_failed = self.publish_failed.load(Ordering::SeqCst);

        ProducerReport {
            attempted: self.attempted.load(Ordering::SeqCst),
            published,
            fetch_failed,
            publish_failed,
            degraded: self.degraded.load(Ordering::SeqCst),
            abandoned: total.saturating_sub(published + fetch_failed + publish_failed),
        }
    }
}

/// State shared by every worker of one run.
struct Worker {
    fetcher: Arc<dyn ObjectFetcher>,
    publisher: Arc<dyn DispatchPublisher>,
    publish_retry: RetryPolicy,
    work: Mutex<mpsc::UnboundedReceiver<ObjectIdentifier>>,
    counters: Counters,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "Producer worker started");

        while let Some(identifier) = self.next_identifier().await {
            self.counters.attempted.fetch_add(1, Ordering::SeqCst);
            self.process(&identifier).await;
        }

        debug!(worker_id, "Producer worker finished");
    }

    /// Take the next identifier, or `None` once the work queue is drained or
    /// shutdown was requested.
    async fn next_identifier(&self) -> Option<ObjectIdentifier> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let mut work = self.work.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            identifier = work.recv() => identifier,
        }
    }

    async fn process(&self, identifier: &ObjectIdentifier) {
        let raw = match self.fetcher.fetch(identifier).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Fetch failed, dropping identifier");
                self.counters.fetch_failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        let extraction = ExifExtractor::extract(&raw);
        drop(raw);

        let degraded = extraction.is_degraded();
        if degraded {
            warn!(
                identifier = %identifier,
                degraded_tags = ?extraction.degraded_tags,
                parse_errors = ?extraction.parse_errors,
                "Extraction degraded"
            );
        }

        let message = DispatchMessage::new(identifier.clone(), extraction.record);
        let published = retry(
            &self.publish_retry,
            |_| self.publisher.publish(&message),
            |e| !matches!(e, PipelineError::Cancelled),
        )
        .await;

        match published {
            Ok(()) => {
                debug!(identifier = %identifier, tags = message.metadata.len(), "Published metadata");
                self.counters.published.fetch_add(1, Ordering::SeqCst);
                if degraded {
                    self.counters.degraded.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Publish failed, dropping identifier");
                self.counters.publish_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Bounded pool running fetch, extract and publish for a list of identifiers.
pub struct ProducerPool {
    fetcher: Arc<dyn ObjectFetcher>,
    publisher: Arc<dyn DispatchPublisher>,
    config: ProducerConfig,
}

impl ProducerPool {
    /// Create a new pool.
    pub fn new(
        fetcher: Arc<dyn ObjectFetcher>,
        publisher: Arc<dyn DispatchPublisher>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            config,
        }
    }

    /// Number of workers started for `identifiers` identifiers.
    pub fn worker_count(&self, identifiers: usize) -> usize {
        match self.config.concurrency {
            0 => identifiers,
            n => n.min(identifiers),
        }
    }

    /// Process every identifier once and wait for the workers to finish.
    ///
    /// When `cancel` fires, workers stop taking new identifiers. Work already
    /// in flight gets the configured grace period and is then aborted; the
    /// identifiers it covered are counted as abandoned.
    #[instrument(skip_all, fields(identifiers = identifiers.len()))]
    pub async fn run(
        &self,
        identifiers: Vec<ObjectIdentifier>,
        cancel: CancellationToken,
    ) -> ProducerReport {
        let total = identifiers.len();
        let workers = self.worker_count(total);
        if workers == 0 {
            return ProducerReport::default();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for identifier in identifiers {
            // The receiver is alive until the pool returns.
            let _ = tx.send(identifier);
        }
        drop(tx);

        let shared = Arc::new(Worker {
            fetcher: Arc::clone(&self.fetcher),
            publisher: Arc::clone(&self.publisher),
            publish_retry: self.config.publish_retry.clone(),
            work: Mutex::new(rx),
            counters: Counters::default(),
            cancel: cancel.clone(),
        });

        info!(workers, identifiers = total, "Starting producer pool");

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            tasks.spawn(Arc::clone(&shared).run(worker_id));
        }

        let finished = tokio::select! {
            _ = Self::join_all(&mut tasks) => true,
            _ = cancel.cancelled() => false,
        };

        if !finished {
            info!(
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "Shutdown requested, waiting for in-flight producers"
            );
            let drained =
                tokio::time::timeout(self.config.shutdown_grace, Self::join_all(&mut tasks)).await;
            if drained.is_err() {
                warn!(in_flight = tasks.len(), "Grace period elapsed, abandoning in-flight producers");
                tasks.abort_all();
                Self::join_all(&mut tasks).await;
            }
        }

        let report = shared.counters.report(total);
        info!(
            attempted = report.attempted,
            published = report.published,
            fetch_failed = report.fetch_failed,
            publish_failed = report.publish_failed,
            degraded = report.degraded,
            abandoned = report.abandoned,
            "Producer pool finished"
        );
        report
    }

    async fn join_all(tasks: &mut JoinSet<()>) {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Producer worker panicked");
                }
            }
        }
    }
}
