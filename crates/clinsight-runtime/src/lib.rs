//! Clinsight runtime: model registry, model implementations and prediction
//! dispatch for the clinical prediction service.
//!
//! The crate is deliberately free of HTTP concerns; the server crate maps
//! [`dispatch::DispatchError`] values onto status codes and response bodies.

pub mod connector;
pub mod dispatch;
pub mod feature;
pub mod metrics;
pub mod model;
pub mod registry;

pub use connector::{ConnectorError, KafkaConfig, KafkaPublisher, PredictionSink, RedisClient};
pub use dispatch::{
    BatchRequest, DispatchError, NoShowPrediction, NoShowRequest, RiskScore, RiskScoreRequest,
    Thresholds,
};
pub use feature::{FeatureRecord, FeatureValue, Frame};
pub use metrics::PredictionMetrics;
pub use model::{BatchOutput, Capabilities, FitKind, Model, ModelError, PersistedModel};
pub use registry::{ModelMetadata, ModelRegistry, RegistryError, REQUIRED_MODELS};
