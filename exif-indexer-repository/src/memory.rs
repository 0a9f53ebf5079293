//! In-memory search engine client.
//!
//! Stores documents in a map and replays a scripted sequence of cluster health
//! levels. Used by the pipeline tests and for local runs without a cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use crate::types::ClusterHealth;
use exif_indexer_shared::{ExifDocument, MetadataRecord, ObjectIdentifier};

/// In-memory implementation of [`SearchEngineClient`].
pub struct MemorySearchClient {
    documents: RwLock<HashMap<ObjectIdentifier, MetadataRecord>>,
    /// Upcoming health answers. The last one repeats forever.
    health: RwLock<VecDeque<ClusterHealth>>,
    current_health: RwLock<ClusterHealth>,
    failing_writes: AtomicUsize,
    write_count: AtomicUsize,
    writes_while_unhealthy: AtomicUsize,
    health_checks: AtomicUsize,
    index_created: AtomicBool,
}

impl MemorySearchClient {
    /// Create a client whose cluster is always green.
    pub fn new() -> Self {
        Self::with_health_sequence([ClusterHealth::Green])
    }

    /// Create a client that answers health checks with `sequence` in order,
    /// repeating the last value once the sequence is exhausted.
    pub fn with_health_sequence(sequence: impl IntoIterator<Item = ClusterHealth>) -> Self {
        let health: VecDeque<ClusterHealth> = sequence.into_iter().collect();
        let initial = health.front().copied().unwrap_or(ClusterHealth::Green);
        Self {
            documents: RwLock::new(HashMap::new()),
            health: RwLock::new(health),
            current_health: RwLock::new(initial),
            failing_writes: AtomicUsize::new(0),
            write_count: AtomicUsize::new(0),
            writes_while_unhealthy: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            index_created: AtomicBool::new(false),
        }
    }

    /// Reject the next `count` writes with [`SearchError::RateLimited`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fetch a stored document body.
    pub async fn document(&self, identifier: &str) -> Option<MetadataRecord> {
        self.documents
            .read()
            .await
            .get(&ObjectIdentifier::from(identifier))
            .cloned()
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Number of successful writes, including overwrites.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of write attempts made while the last reported health was red.
    pub fn writes_while_unhealthy(&self) -> usize {
        self.writes_while_unhealthy.load(Ordering::SeqCst)
    }

    /// Number of health checks answered.
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Whether `ensure_index_exists` has been called.
    pub fn index_created(&self) -> bool {
        self.index_created.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemorySearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngineClient for MemorySearchClient {
    async fn cluster_health(&self) -> Result<ClusterHealth, SearchError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);

        let mut health = self.health.write().await;
        let status = if health.len() > 1 {
            health.pop_front()
        } else {
            health.front().copied()
        }
        .unwrap_or(ClusterHealth::Green);

        *self.current_health.write().await = status;
        Ok(status)
    }

    async fn index_document(&self, document: &ExifDocument) -> Result<(), SearchError> {
        if !self.current_health.read().await.is_ready() {
            self.writes_while_unhealthy.fetch_add(1, Ordering::SeqCst);
        }

        if self.take_failure() {
            return Err(SearchError::rate_limited("Slow down"));
        }

        self.documents
            .write()
            .await
            .insert(document.identifier.clone(), document.metadata.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);

        debug!(identifier = %document.identifier, "Stored document in memory");
        Ok(())
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        self.index_created.store(true, Ordering::SeqCst);
        Ok(())
    }
}
