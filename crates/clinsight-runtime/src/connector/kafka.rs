//! Kafka publisher for prediction events.
//!
//! Provides both a stub implementation (always available) and a full
//! implementation (requires the `kafka` feature flag with rdkafka). The
//! service treats publishing as best-effort either way.

use super::{ConnectorError, PredictionSink};
use async_trait::async_trait;
use indexmap::IndexMap;

/// Kafka configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub client_id: Option<String>,
    pub properties: IndexMap<String, String>,
}

impl KafkaConfig {
    pub fn new(brokers: &str, topic: &str) -> Self {
        Self {
            brokers: brokers.to_string(),
            topic: topic.to_string(),
            client_id: None,
            properties: IndexMap::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn with_properties(mut self, props: IndexMap<String, String>) -> Self {
        self.properties = props;
        self
    }
}

#[cfg(feature = "kafka")]
mod kafka_impl {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use std::time::Duration;
    use tracing::info;

    /// Apply user-provided properties to a ClientConfig, skipping keys
    /// that are already explicitly set by our code.
    fn apply_properties(client_config: &mut ClientConfig, props: &IndexMap<String, String>) {
        for (k, v) in props {
            match k.as_str() {
                "bootstrap.servers" | "client.id" => continue,
                _ => {
                    client_config.set(k, v);
                }
            }
        }
    }

    /// Kafka publisher with rdkafka.
    pub struct KafkaPublisher {
        name: String,
        config: KafkaConfig,
        producer: FutureProducer,
    }

    impl KafkaPublisher {
        pub fn new(name: &str, config: KafkaConfig) -> Result<Self, ConnectorError> {
            let mut client_config = ClientConfig::new();
            client_config
                .set("bootstrap.servers", &config.brokers)
                .set("message.timeout.ms", "30000")
                .set("linger.ms", "5")
                .set("compression.type", "lz4")
                .set("acks", "all");

            if let Some(client_id) = &config.client_id {
                client_config.set("client.id", client_id);
            }

            apply_properties(&mut client_config, &config.properties);

            let producer: FutureProducer = client_config
                .create()
                .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

            info!(name, brokers = %config.brokers, topic = %config.topic, "Kafka publisher initialized");

            Ok(Self {
                name: name.to_string(),
                config,
                producer,
            })
        }
    }

    #[async_trait]
    impl PredictionSink for KafkaPublisher {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(
            &self,
            key: &str,
            payload: &serde_json::Value,
        ) -> Result<(), ConnectorError> {
            let body = serde_json::to_vec(payload)
                .map_err(|e| ConnectorError::SendFailed(e.to_string()))?;

            let record = FutureRecord::to(&self.config.topic).key(key).payload(&body);
            self.producer
                .send(record, Duration::from_secs(5))
                .await
                .map_err(|(e, _)| ConnectorError::SendFailed(e.to_string()))?;

            Ok(())
        }

        async fn close(&self) -> Result<(), ConnectorError> {
            self.producer
                .flush(Duration::from_secs(5))
                .map_err(|e| ConnectorError::SendFailed(e.to_string()))?;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }
}

#[cfg(feature = "kafka")]
pub use kafka_impl::KafkaPublisher;

/// Kafka publisher (stub implementation).
#[cfg(not(feature = "kafka"))]
#[derive(Debug)]
pub struct KafkaPublisher {
    name: String,
    #[allow(dead_code)]
    config: KafkaConfig,
}

#[cfg(not(feature = "kafka"))]
impl KafkaPublisher {
    pub fn new(name: &str, _config: KafkaConfig) -> Result<Self, ConnectorError> {
        Err(ConnectorError::NotAvailable(format!(
            "Kafka publisher '{}' requires the 'kafka' feature. Enable with: cargo build --features kafka",
            name
        )))
    }
}

#[cfg(not(feature = "kafka"))]
#[async_trait]
impl PredictionSink for KafkaPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        _key: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotAvailable(
            "Kafka publisher requires 'kafka' feature".to_string(),
        ))
    }

    fn is_connected(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_sets_fields() {
        let mut props = IndexMap::new();
        props.insert("linger.ms".to_string(), "10".to_string());
        let config = KafkaConfig::new("localhost:9092", "ai-predictions")
            .with_client_id("clinsight")
            .with_properties(props);
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.topic, "ai-predictions");
        assert_eq!(config.client_id.as_deref(), Some("clinsight"));
        assert_eq!(config.properties.get("linger.ms").map(String::as_str), Some("10"));
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn stub_publisher_reports_not_available() {
        let err = KafkaPublisher::new("test", KafkaConfig::new("localhost:9092", "t")).unwrap_err();
        assert!(matches!(err, ConnectorError::NotAvailable(_)));
    }
}
