//! Broker publisher seam.

use std::sync::Arc;

use async_trait::async_trait;

use parley_core::config::BrokerConfig;
use parley_core::error::AppError;
use parley_core::result::AppResult;
use parley_core::types::GroupId;

use super::memory_pubsub::MemoryPubSub;

/// Publishes serialized events to a named topic.
///
/// Delivery through the broker is best-effort; failures are logged by the
/// caller and never reach the sender of the message.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    /// Publish one payload to `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()>;
}

/// Topic carrying new messages of one group.
pub fn group_topic(prefix: &str, group_id: &GroupId) -> String {
    format!("{prefix}.group.{group_id}")
}

/// Build the configured publisher, or `None` when publication is disabled.
pub async fn build_publisher(config: &BrokerConfig) -> AppResult<Option<Arc<dyn EventPublisher>>> {
    if !config.enabled {
        return Ok(None);
    }

    match config.provider.as_str() {
        "memory" => {
            tracing::info!("Broker publication enabled (in-memory)");
            Ok(Some(Arc::new(MemoryPubSub::new(config.buffer_size))))
        }
        #[cfg(feature = "redis-pubsub")]
        "redis" => {
            let publisher = super::redis_pubsub::RedisPublisher::connect(&config.url).await?;
            tracing::info!("Broker publication enabled (redis)");
            Ok(Some(Arc::new(publisher)))
        }
        #[cfg(not(feature = "redis-pubsub"))]
        "redis" => Err(AppError::configuration(
            "broker.provider 'redis' requires the redis-pubsub feature",
        )),
        other => Err(AppError::configuration(format!(
            "Unknown broker provider: '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_topic_format() {
        let group = GroupId::new();
        assert_eq!(group_topic("parley", &group), format!("parley.group.{group}"));
    }

    #[tokio::test]
    async fn test_disabled_broker_builds_nothing() {
        let config = BrokerConfig::default();
        assert!(build_publisher(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let config = BrokerConfig {
            enabled: true,
            provider: "kafka".to_string(),
            ..BrokerConfig::default()
        };
        let err = build_publisher(&config).await.err().unwrap();
        assert_eq!(err.kind, parley_core::ErrorKind::Configuration);
    }
}
