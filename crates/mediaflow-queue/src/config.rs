//! Queue configuration and transport construction.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use mediaflow_models::RetryPolicy;

use crate::error::{QueueError, QueueResult};
use crate::memory::MemoryTransport;
use crate::redis_transport::{RedisTransport, DEFAULT_VISIBILITY_TIMEOUT};
use crate::transport::JobTransport;

/// Which transport backs the queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for QueueBackend {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(QueueError::InvalidConfig(format!(
                "unknown QUEUE_BACKEND {:?}",
                other
            ))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Redis URL
    pub redis_url: String,
    /// Lease on a claimed Redis job before it is presumed abandoned
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let defaults = Self::default();

        let backend = match std::env::var("QUEUE_BACKEND") {
            Ok(value) if !value.is_empty() => value.parse()?,
            _ => defaults.backend,
        };

        Ok(Self {
            backend,
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        })
    }

    /// Build the configured transport, redelivering failures under `retry`.
    pub async fn connect(&self, retry: RetryPolicy) -> QueueResult<Arc<dyn JobTransport>> {
        let transport: Arc<dyn JobTransport> = match self.backend {
            QueueBackend::Redis => Arc::new(
                RedisTransport::connect(&self.redis_url, retry)
                    .await?
                    .with_visibility_timeout(self.visibility_timeout),
            ),
            QueueBackend::Memory => Arc::new(MemoryTransport::new(retry)),
        };
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("redis".parse::<QueueBackend>().unwrap(), QueueBackend::Redis);
        assert_eq!("Memory".parse::<QueueBackend>().unwrap(), QueueBackend::Memory);
        assert!("kafka".parse::<QueueBackend>().is_err());
    }

    #[tokio::test]
    async fn test_memory_backend_connects() {
        let config = QueueConfig {
            backend: QueueBackend::Memory,
            ..Default::default()
        };
        let transport = config.connect(RetryPolicy::default()).await.unwrap();
        transport.close().await.unwrap();
    }
}
