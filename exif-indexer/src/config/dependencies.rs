//! Dependency initialization and wiring for the EXIF indexer.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Settings;
use crate::IndexingError;
use exif_indexer_pipeline::{
    catalog::HttpCatalog,
    fetcher::HttpFetcher,
    orchestrator::{Orchestrator, OrchestratorConfig},
    producer::ProducerConfig,
    queue::{KafkaConfig, KafkaConsumer, KafkaPublisher},
    retry::RetryPolicy,
    sink::SinkConfig,
};
use exif_indexer_repository::{IndexConfig, OpenSearchClient};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from `settings`.
    ///
    /// Nothing here waits for the broker or the search cluster; readiness is
    /// handled by the index sink.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a client could not be constructed
    pub async fn new(settings: &Settings) -> Result<Self, IndexingError> {
        info!(
            catalog_url = %settings.catalog_url,
            kafka_broker = %settings.kafka_broker,
            kafka_topic = %settings.kafka_topic,
            opensearch_url = %settings.opensearch_url,
            "Initializing dependencies"
        );

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IndexingError::config(format!("Failed to create HTTP client: {}", e)))?;

        let catalog = HttpCatalog::new(
            http.clone(),
            settings.catalog_url.clone(),
            settings.catalog_key_tag.clone(),
            RetryPolicy::fixed(settings.catalog_retry_delay, Some(settings.catalog_retry_attempts)),
        );
        let fetcher = HttpFetcher::new(http, settings.catalog_url.clone());

        let mut kafka = KafkaConfig::new(
            settings.kafka_broker.clone(),
            settings.kafka_topic.clone(),
            settings.kafka_group_id.clone(),
        );
        if let (Some(username), Some(password)) = (&settings.kafka_username, &settings.kafka_password) {
            kafka = kafka.with_credentials(username.clone(), password.clone());
        }

        let publisher = KafkaPublisher::new(&kafka)?;
        let consumer = KafkaConsumer::new(&kafka)?;
        consumer.subscribe()?;
        info!("Kafka publisher and consumer created");

        let search_client = OpenSearchClient::new(
            &settings.opensearch_url,
            IndexConfig::new(settings.opensearch_index.clone()),
        )
        .await?;
        info!(index = %search_client.index_name(), "OpenSearch client created");

        let config = OrchestratorConfig {
            producer: ProducerConfig {
                concurrency: settings.producer_concurrency,
                publish_retry: RetryPolicy::exponential(
                    settings.publish_retry_attempts,
                    Duration::from_millis(200),
                    Duration::from_secs(5),
                ),
                shutdown_grace: settings.shutdown_grace,
            },
            sink: SinkConfig {
                health_poll: RetryPolicy::fixed(settings.health_poll_interval, settings.health_max_attempts),
                idle_timeout: settings.sink_idle_timeout,
                ..SinkConfig::default()
            },
        };

        let orchestrator = Orchestrator::new(
            Arc::new(catalog),
            Arc::new(fetcher),
            Arc::new(publisher),
            Box::new(consumer),
            Arc::new(search_client),
            config,
        );

        Ok(Self { orchestrator })
    }
}
