//! Shared application state injected into request handlers.

use clinsight_runtime::{ModelRegistry, PredictionMetrics, PredictionSink, RedisClient, Thresholds};
use std::sync::Arc;

/// Everything a handler needs, cloned into each route.
///
/// `registry` and `kafka` are optional: the service starts degraded without
/// them and the health endpoints report the gap. Redis is mandatory at
/// startup but carried as an `Option` so handler tests can run without an
/// instance.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Option<Arc<ModelRegistry>>,
    pub redis: Option<RedisClient>,
    pub kafka: Option<Arc<dyn PredictionSink>>,
    pub metrics: PredictionMetrics,
    pub thresholds: Thresholds,
}

impl AppContext {
    pub fn new(registry: Option<Arc<ModelRegistry>>, thresholds: Thresholds) -> Self {
        Self {
            registry,
            redis: None,
            kafka: None,
            metrics: PredictionMetrics::new(),
            thresholds,
        }
    }

    pub fn with_redis(mut self, redis: Option<RedisClient>) -> Self {
        self.redis = redis;
        self
    }

    pub fn with_kafka(mut self, kafka: Option<Arc<dyn PredictionSink>>) -> Self {
        self.kafka = kafka;
        self
    }
}
