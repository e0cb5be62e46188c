//! Redis publisher for multi-node deployments.

#[cfg(feature = "redis-pubsub")]
mod implementation {
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;

    use parley_core::error::AppError;
    use parley_core::result::AppResult;

    use crate::bridge::publisher::EventPublisher;

    /// Publishes to Redis channels over a reconnecting connection.
    #[derive(Clone)]
    pub struct RedisPublisher {
        conn: ConnectionManager,
    }

    impl std::fmt::Debug for RedisPublisher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisPublisher").finish()
        }
    }

    impl RedisPublisher {
        /// Connect to the Redis server at `url`.
        pub async fn connect(url: &str) -> AppResult<Self> {
            let client = redis::Client::open(url)
                .map_err(|e| AppError::configuration(format!("Invalid Redis URL: {e}")))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| AppError::external_service(format!("Redis connection failed: {e}")))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl EventPublisher for RedisPublisher {
        async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
            let mut conn = self.conn.clone();
            redis::cmd("PUBLISH")
                .arg(topic)
                .arg(payload)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| AppError::external_service(format!("Redis PUBLISH failed: {e}")))?;
            Ok(())
        }
    }
}

#[cfg(feature = "redis-pubsub")]
pub use implementation::RedisPublisher;
