//! Request and response types for search index operations.

use std::fmt;
use std::str::FromStr;

use crate::errors::SearchError;

/// Severity level reported by the cluster health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterHealth {
    /// All shards allocated.
    Green,
    /// Primaries allocated, some replicas missing. Writes are accepted.
    Yellow,
    /// At least one primary shard is unassigned.
    Red,
}

impl ClusterHealth {
    /// Whether documents may be written at this health level.
    pub fn is_ready(&self) -> bool {
        !matches!(self, ClusterHealth::Red)
    }

    /// The status string used by the cluster API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterHealth::Green => "green",
            ClusterHealth::Yellow => "yellow",
            ClusterHealth::Red => "red",
        }
    }
}

impl fmt::Display for ClusterHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterHealth {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "green" => Ok(ClusterHealth::Green),
            "yellow" => Ok(ClusterHealth::Yellow),
            "red" => Ok(ClusterHealth::Red),
            other => Err(SearchError::health(format!(
                "Unknown cluster status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!("green".parse::<ClusterHealth>().unwrap(), ClusterHealth::Green);
        assert_eq!("YELLOW".parse::<ClusterHealth>().unwrap(), ClusterHealth::Yellow);
        assert_eq!("red".parse::<ClusterHealth>().unwrap(), ClusterHealth::Red);
        assert!("purple".parse::<ClusterHealth>().is_err());
    }

    #[test]
    fn test_readiness() {
        assert!(ClusterHealth::Green.is_ready());
        assert!(ClusterHealth::Yellow.is_ready());
        assert!(!ClusterHealth::Red.is_ready());
    }
}
