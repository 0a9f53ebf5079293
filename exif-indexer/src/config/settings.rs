//! Runtime settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::IndexingError;

const DEFAULT_CATALOG_URL: &str = "http://s3.amazonaws.com/waldo-recruiting";
const DEFAULT_CATALOG_KEY_TAG: &str = "Key";
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";
const DEFAULT_KAFKA_TOPIC: &str = "exif.metadata";
const DEFAULT_KAFKA_GROUP_ID: &str = "exif-indexer";
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_OPENSEARCH_INDEX: &str = "exif";

/// All settings of one indexer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub catalog_url: String,
    pub catalog_key_tag: String,
    pub catalog_retry_attempts: u32,
    pub catalog_retry_delay: Duration,
    pub kafka_broker: String,
    pub kafka_username: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub opensearch_url: String,
    pub opensearch_index: String,
    pub health_poll_interval: Duration,
    /// `None` polls until shutdown.
    pub health_max_attempts: Option<u32>,
    /// `0` starts one worker per identifier.
    pub producer_concurrency: usize,
    pub publish_retry_attempts: u32,
    /// `None` consumes until shutdown.
    pub sink_idle_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `CATALOG_URL`: Catalog base URL (default: http://s3.amazonaws.com/waldo-recruiting)
    /// - `CATALOG_KEY_TAG`: XML element holding identifiers (default: Key)
    /// - `CATALOG_RETRY_ATTEMPTS` / `CATALOG_RETRY_DELAY_SECS`: Listing retries (default: 10 / 5)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD`: Optional SASL/PLAIN credentials
    /// - `KAFKA_TOPIC`: Dispatch topic (default: exif.metadata)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: exif-indexer)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_INDEX`: Index name (default: exif)
    /// - `HEALTH_POLL_INTERVAL_SECS` / `HEALTH_MAX_ATTEMPTS`: Readiness polling (default: 5 / 0 = unbounded)
    /// - `PRODUCER_CONCURRENCY`: Producer workers (default: 16, 0 = one per identifier)
    /// - `PUBLISH_RETRY_ATTEMPTS`: Publish attempts per identifier (default: 3)
    /// - `SINK_IDLE_TIMEOUT_SECS`: Idle completion (default: 30, 0 = never)
    /// - `SHUTDOWN_GRACE_SECS`: Grace period for in-flight producers (default: 10)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let health_max_attempts: u32 = parse(&lookup, "HEALTH_MAX_ATTEMPTS", 0)?;
        let sink_idle_secs: u64 = parse(&lookup, "SINK_IDLE_TIMEOUT_SECS", 30)?;
        let publish_retry_attempts: u32 = parse(&lookup, "PUBLISH_RETRY_ATTEMPTS", 3)?;
        let catalog_retry_attempts: u32 = parse(&lookup, "CATALOG_RETRY_ATTEMPTS", 10)?;

        if publish_retry_attempts == 0 || catalog_retry_attempts == 0 {
            return Err(IndexingError::config(
                "CATALOG_RETRY_ATTEMPTS and PUBLISH_RETRY_ATTEMPTS must be at least 1",
            ));
        }

        Ok(Self {
            catalog_url: string("CATALOG_URL", DEFAULT_CATALOG_URL),
            catalog_key_tag: string("CATALOG_KEY_TAG", DEFAULT_CATALOG_KEY_TAG),
            catalog_retry_attempts,
            catalog_retry_delay: Duration::from_secs(parse(&lookup, "CATALOG_RETRY_DELAY_SECS", 5)?),
            kafka_broker: string("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            kafka_username: lookup("KAFKA_USERNAME").filter(|v| !v.is_empty()),
            kafka_password: lookup("KAFKA_PASSWORD").filter(|v| !v.is_empty()),
            kafka_topic: string("KAFKA_TOPIC", DEFAULT_KAFKA_TOPIC),
            kafka_group_id: string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            opensearch_url: string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            opensearch_index: string("OPENSEARCH_INDEX", DEFAULT_OPENSEARCH_INDEX),
            health_poll_interval: Duration::from_secs(parse(&lookup, "HEALTH_POLL_INTERVAL_SECS", 5)?),
            health_max_attempts: (health_max_attempts > 0).then_some(health_max_attempts),
            producer_concurrency: parse(&lookup, "PRODUCER_CONCURRENCY", 16)?,
            publish_retry_attempts,
            sink_idle_timeout: (sink_idle_secs > 0).then(|| Duration::from_secs(sink_idle_secs)),
            shutdown_grace: Duration::from_secs(parse(&lookup, "SHUTDOWN_GRACE_SECS", 10)?),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, IndexingError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("Invalid {key}={raw:?}: {e}"))),
    }
}
