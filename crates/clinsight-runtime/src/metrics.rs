//! Prometheus metrics for the prediction service.

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Service-level Prometheus metrics, shared across handlers.
#[derive(Clone)]
pub struct PredictionMetrics {
    registry: Arc<Registry>,
    /// Prediction counter by model and outcome (success, invalid_input,
    /// not_found, error).
    pub predictions_total: CounterVec,
    /// End-to-end prediction latency in seconds, by model.
    pub prediction_duration_seconds: HistogramVec,
    /// 1 when a model is loaded and trained, 0 otherwise.
    pub models_loaded: GaugeVec,
}

impl PredictionMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new(
                "clinsight_predictions_total",
                "Total predictions by model and outcome",
            ),
            &["model", "outcome"],
        )
        .expect("failed to create predictions_total counter");

        let prediction_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "clinsight_prediction_duration_seconds",
                "Prediction latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["model"],
        )
        .expect("failed to create prediction_duration_seconds histogram");

        let models_loaded = GaugeVec::new(
            Opts::new("clinsight_models_loaded", "Loaded and trained models"),
            &["model"],
        )
        .expect("failed to create models_loaded gauge");

        registry
            .register(Box::new(predictions_total.clone()))
            .expect("failed to register predictions_total");
        registry
            .register(Box::new(prediction_duration_seconds.clone()))
            .expect("failed to register prediction_duration_seconds");
        registry
            .register(Box::new(models_loaded.clone()))
            .expect("failed to register models_loaded");

        Self {
            registry: Arc::new(registry),
            predictions_total,
            prediction_duration_seconds,
            models_loaded,
        }
    }

    /// Record a completed prediction call.
    pub fn record_prediction(&self, model: &str, outcome: &str, duration_secs: f64) {
        self.predictions_total
            .with_label_values(&[model, outcome])
            .inc();
        self.prediction_duration_seconds
            .with_label_values(&[model])
            .observe(duration_secs);
    }

    /// Record model availability.
    pub fn set_model_loaded(&self, model: &str, loaded: bool) {
        self.models_loaded
            .with_label_values(&[model])
            .set(if loaded { 1.0 } else { 0.0 });
    }

    /// Get Prometheus text output.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_prediction() {
        let m = PredictionMetrics::new();
        m.record_prediction("no_show_predictor", "success", 0.002);
        m.record_prediction("no_show_predictor", "invalid_input", 0.001);
        let output = m.gather();
        assert!(output.contains("clinsight_predictions_total"));
        assert!(output.contains("clinsight_prediction_duration_seconds"));
    }

    #[test]
    fn test_model_loaded_gauge() {
        let m = PredictionMetrics::new();
        m.set_model_loaded("risk_scorer", true);
        m.set_model_loaded("no_show_predictor", false);
        let output = m.gather();
        assert!(output.contains("clinsight_models_loaded"));
    }

    #[test]
    fn test_clone_shares_registry() {
        let m1 = PredictionMetrics::new();
        let m2 = m1.clone();
        m2.record_prediction("risk_scorer", "success", 0.5);
        let output = m1.gather();
        assert!(output.contains("clinsight_predictions_total"));
    }

    #[test]
    fn test_default() {
        let m = PredictionMetrics::default();
        m.set_model_loaded("no_show_predictor", true);
        assert!(m.gather().contains("clinsight_models_loaded"));
    }
}
