//! External-system connectors: Redis health backend and Kafka publishing.

mod kafka;
mod redis;

pub use kafka::{KafkaConfig, KafkaPublisher};
pub use redis::RedisClient;

use async_trait::async_trait;

/// Errors that can occur during connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Failed to establish connection to the external system.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to send/publish a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Requested connector is not available.
    /// May require enabling a feature flag (e.g., `kafka`).
    #[error("Connector not available: {0}")]
    NotAvailable(String),
}

/// Sink for emitted prediction events. `publish` takes `&self` so one sink
/// can be shared across concurrent request handlers.
#[async_trait]
pub trait PredictionSink: Send + Sync {
    /// Name/identifier of this sink instance.
    fn name(&self) -> &str;

    /// Publish one prediction payload under a routing key.
    async fn publish(&self, key: &str, payload: &serde_json::Value) -> Result<(), ConnectorError>;

    /// Flush outstanding messages and release resources.
    async fn close(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn is_connected(&self) -> bool;
}
