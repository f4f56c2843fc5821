//! Redis connectivity for service health.
//!
//! The service only needs a live connection and a PING round-trip; all other
//! Redis usage lives in sibling services sharing the instance.

use super::ConnectorError;
use redis::aio::ConnectionManager;

/// Shared handle to the Redis instance. Cloning is cheap; the underlying
/// manager multiplexes and reconnects on its own.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Connect and verify the connection with an initial PING.
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = redis::Client::open(url)
            .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

        let this = Self { manager };
        this.ping().await?;
        Ok(this)
    }

    /// PING round-trip; `Ok` means the instance is reachable right now.
    pub async fn ping(&self) -> Result<(), ConnectorError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}
