//! Prediction dispatch: request → model invocation → uniformly shaped result.
//!
//! All model failures are logged here with endpoint/model/identifier context
//! and replaced by a sanitized [`DispatchError`]; raw error text never crosses
//! the service boundary. Risk bucketing for the no-show path uses configured
//! [`Thresholds`] (defaults match the reference deployment) and is a pure
//! function of the score, recomputed on every call.

use crate::feature::{FeatureRecord, FeatureValue, Frame};
use crate::model::{BatchOutput, Model, ModelError};
use crate::registry::ModelRegistry;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

pub const NO_SHOW_MODEL: &str = "no_show_predictor";
pub const RISK_MODEL: &str = "risk_scorer";

/// Sanitized, client-facing failure categories. The `Display` text is exactly
/// what clients are allowed to see.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Model not found")]
    NotFound,
    #[error("Invalid input")]
    InvalidInput,
    #[error("Prediction failed")]
    Internal,
}

/// Classification and risk-bucket thresholds, configuration-driven.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Probability at or above which the no-show label is positive.
    pub no_show_label: f64,
    /// 3-level bucket bounds for the no-show path.
    pub high_risk: f64,
    pub medium_risk: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            no_show_label: 0.5,
            high_risk: 0.7,
            medium_risk: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoShowRequest {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub features: FeatureRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoShowPrediction {
    pub prediction: i64,
    pub probability: f64,
    pub risk_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RiskScoreRequest {
    pub patient_id: i64,
    pub patient_data: FeatureRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub risk_score: f64,
    pub risk_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub model_name: String,
    pub data: Vec<FeatureRecord>,
}

/// 3-level bucket for the no-show path. Deliberately separate from the risk
/// scorer's own 4-level categorizer.
fn no_show_bucket(probability: f64, thresholds: &Thresholds) -> String {
    if probability >= thresholds.high_risk {
        "HIGH"
    } else if probability >= thresholds.medium_risk {
        "MEDIUM"
    } else {
        "LOW"
    }
    .to_string()
}

struct ErrorContext<'a> {
    endpoint: &'static str,
    model: &'a str,
    patient_id: Option<i64>,
    appointment_id: Option<i64>,
}

/// Log full failure detail and collapse it into a sanitized category.
fn sanitize(e: ModelError, ctx: &ErrorContext<'_>) -> DispatchError {
    error!(
        endpoint = ctx.endpoint,
        model = ctx.model,
        patient_id = ctx.patient_id,
        appointment_id = ctx.appointment_id,
        error = %e,
        "prediction failed"
    );
    match e {
        ModelError::InvalidInput(_) => DispatchError::InvalidInput,
        _ => DispatchError::Internal,
    }
}

async fn resolve(
    registry: &ModelRegistry,
    name: &str,
    endpoint: &'static str,
) -> Result<Arc<dyn Model>, DispatchError> {
    registry.get_model(name).await.map_err(|e| {
        error!(endpoint, model = name, error = %e, "model resolution failed");
        DispatchError::NotFound
    })
}

/// Single-record no-show prediction. Prefers the model's single-record
/// probability path, otherwise routes a one-row frame through the batch path.
pub async fn predict_no_show(
    registry: &ModelRegistry,
    thresholds: &Thresholds,
    request: &NoShowRequest,
) -> Result<NoShowPrediction, DispatchError> {
    let model = resolve(registry, NO_SHOW_MODEL, "predict_no_show").await?;
    let ctx = ErrorContext {
        endpoint: "predict_no_show",
        model: NO_SHOW_MODEL,
        patient_id: Some(request.patient_id),
        appointment_id: request.appointment_id,
    };

    // Identifiers ride along for enrichment and logging only.
    let mut features = request.features.clone();
    features
        .entry("patient_id".to_string())
        .or_insert(FeatureValue::Int(request.patient_id));
    if let Some(id) = request.appointment_id {
        features
            .entry("appointment_id".to_string())
            .or_insert(FeatureValue::Int(id));
    }

    let caps = model.capabilities();
    let probability = if caps.single_record {
        model
            .predict_proba_single(&features)
            .map_err(|e| sanitize(e, &ctx))?
    } else {
        let frame = Frame::from_record(features.clone());
        let probs = model.predict_proba(&frame).map_err(|e| sanitize(e, &ctx))?;
        probs.first().copied().ok_or_else(|| {
            sanitize(ModelError::Internal("empty probability output".into()), &ctx)
        })?
    };

    Ok(NoShowPrediction {
        prediction: i64::from(probability >= thresholds.no_show_label),
        probability,
        risk_level: no_show_bucket(probability, thresholds),
        confidence: model.confidence(),
        factors: if caps.explanations {
            model.explain(&features)
        } else {
            None
        },
    })
}

/// Composite risk score for one patient record, always through the batch
/// composite method on a one-row frame.
pub async fn risk_score(
    registry: &ModelRegistry,
    request: &RiskScoreRequest,
) -> Result<RiskScore, DispatchError> {
    let model = resolve(registry, RISK_MODEL, "predict_risk").await?;
    let ctx = ErrorContext {
        endpoint: "predict_risk",
        model: RISK_MODEL,
        patient_id: Some(request.patient_id),
        appointment_id: None,
    };

    let frame = Frame::from_record(request.patient_data.clone());
    let scores = model.composite_risk(&frame).map_err(|e| sanitize(e, &ctx))?;
    let score = scores
        .first()
        .copied()
        .ok_or_else(|| sanitize(ModelError::Internal("empty score output".into()), &ctx))?;

    let risk_level = match model.categorize(&[score]) {
        Ok(mut levels) => levels.pop().unwrap_or_else(|| "UNKNOWN".to_string()),
        Err(ModelError::Unsupported(_)) => "UNKNOWN".to_string(),
        Err(e) => return Err(sanitize(e, &ctx)),
    };

    Ok(RiskScore {
        risk_score: score,
        risk_level,
        confidence: model.confidence(),
        factors: if model.capabilities().explanations {
            model.explain(&request.patient_data)
        } else {
            None
        },
    })
}

/// Batch prediction against an arbitrary registered model. Prefers the
/// model-native batch method; otherwise assembles a minimal result from the
/// separate predict/predict_proba methods.
pub async fn predict_batch(
    registry: &ModelRegistry,
    request: &BatchRequest,
) -> Result<BatchOutput, DispatchError> {
    let model = resolve(registry, &request.model_name, "predict_batch").await?;
    let ctx = ErrorContext {
        endpoint: "predict_batch",
        model: &request.model_name,
        patient_id: None,
        appointment_id: None,
    };

    let frame = Frame::from_records(request.data.clone());
    let caps = model.capabilities();

    if caps.batch_native {
        return model.predict_batch(&frame).map_err(|e| sanitize(e, &ctx));
    }

    let predictions = model.predict(&frame).map_err(|e| sanitize(e, &ctx))?;
    let probabilities = if caps.probabilities {
        Some(model.predict_proba(&frame).map_err(|e| sanitize(e, &ctx))?)
    } else {
        None
    };

    Ok(BatchOutput {
        predictions,
        probabilities,
        risk_levels: None,
        explanations: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::record;
    use crate::model::{Capabilities, PatientRiskScorer};
    use crate::registry::ModelRegistry;

    /// Single-record model that always reports a fixed probability.
    struct FixedProba(f64);

    impl Model for FixedProba {
        fn is_trained(&self) -> bool {
            true
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                single_record: true,
                ..Capabilities::default()
            }
        }
        fn predict(&self, frame: &Frame) -> Result<Vec<i64>, ModelError> {
            Ok(vec![i64::from(self.0 >= 0.5); frame.len()])
        }
        fn predict_proba_single(&self, _record: &FeatureRecord) -> Result<f64, ModelError> {
            Ok(self.0)
        }
    }

    /// Model whose single-record path fails with a chosen error.
    struct Failing(fn() -> ModelError);

    impl Model for Failing {
        fn is_trained(&self) -> bool {
            true
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                single_record: true,
                ..Capabilities::default()
            }
        }
        fn predict(&self, _frame: &Frame) -> Result<Vec<i64>, ModelError> {
            Err((self.0)())
        }
        fn predict_proba_single(&self, _record: &FeatureRecord) -> Result<f64, ModelError> {
            Err((self.0)())
        }
    }

    /// Scorer without a categorizer.
    struct BareScorer;

    impl Model for BareScorer {
        fn is_trained(&self) -> bool {
            true
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                composite_risk: true,
                ..Capabilities::default()
            }
        }
        fn predict(&self, _frame: &Frame) -> Result<Vec<i64>, ModelError> {
            Err(ModelError::Unsupported("predict"))
        }
        fn composite_risk(&self, frame: &Frame) -> Result<Vec<f64>, ModelError> {
            Ok(vec![0.5; frame.len()])
        }
    }

    fn no_show_request() -> NoShowRequest {
        NoShowRequest {
            patient_id: 2001,
            appointment_id: Some(12345),
            features: record(&[("patient_age", 54.into())]),
        }
    }

    async fn registry_with(name: &str, model: Arc<dyn Model>) -> ModelRegistry {
        let registry = ModelRegistry::new("unused");
        registry.register(name, model).await;
        registry
    }

    #[tokio::test]
    async fn no_show_bucket_boundaries_are_inclusive() {
        let thresholds = Thresholds::default();
        for (p, expected) in [
            (0.7, "HIGH"),
            (0.4, "MEDIUM"),
            (0.39999, "LOW"),
            (0.9, "HIGH"), // no CRITICAL on this scale
        ] {
            let registry = registry_with(NO_SHOW_MODEL, Arc::new(FixedProba(p))).await;
            let out = predict_no_show(&registry, &thresholds, &no_show_request())
                .await
                .unwrap();
            assert_eq!(out.risk_level, expected, "probability {p}");
        }
    }

    #[tokio::test]
    async fn no_show_label_uses_configured_threshold() {
        let registry = registry_with(NO_SHOW_MODEL, Arc::new(FixedProba(0.5))).await;
        let out = predict_no_show(&registry, &Thresholds::default(), &no_show_request())
            .await
            .unwrap();
        assert_eq!(out.prediction, 1);

        let strict = Thresholds {
            no_show_label: 0.6,
            ..Thresholds::default()
        };
        let out = predict_no_show(&registry, &strict, &no_show_request())
            .await
            .unwrap();
        assert_eq!(out.prediction, 0);
    }

    #[tokio::test]
    async fn missing_model_maps_to_not_found() {
        let registry = ModelRegistry::new("unused");
        let err = predict_no_show(&registry, &Thresholds::default(), &no_show_request())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NotFound);
    }

    #[tokio::test]
    async fn invalid_input_and_internal_errors_are_sanitized() {
        let registry = registry_with(
            NO_SHOW_MODEL,
            Arc::new(Failing(|| ModelError::InvalidInput("bad features: leak".into()))),
        )
        .await;
        let err = predict_no_show(&registry, &Thresholds::default(), &no_show_request())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::InvalidInput);
        assert_eq!(err.to_string(), "Invalid input");

        let registry = registry_with(
            NO_SHOW_MODEL,
            Arc::new(Failing(|| ModelError::Internal("internal details: secret".into()))),
        )
        .await;
        let err = predict_no_show(&registry, &Thresholds::default(), &no_show_request())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Internal);
        assert_eq!(err.to_string(), "Prediction failed");
    }

    #[tokio::test]
    async fn risk_score_uses_model_categorizer() {
        let registry =
            registry_with(RISK_MODEL, Arc::new(PatientRiskScorer::new())).await;
        let request = RiskScoreRequest {
            patient_id: 2001,
            patient_data: record(&[
                ("age", 50.into()),
                ("cholesterol", 250.into()),
                ("glucose_level", 150.into()),
                ("previous_admissions", 2.into()),
            ]),
        };
        let out = risk_score(&registry, &request).await.unwrap();
        assert!((out.risk_score - (1.0 + 0.5 + 0.25) / 3.0).abs() < 1e-12);
        assert_eq!(out.risk_level, "MEDIUM");
    }

    #[tokio::test]
    async fn risk_score_without_categorizer_reports_unknown() {
        let registry = registry_with(RISK_MODEL, Arc::new(BareScorer)).await;
        let request = RiskScoreRequest {
            patient_id: 1,
            patient_data: record(&[("age", 10.into())]),
        };
        let out = risk_score(&registry, &request).await.unwrap();
        assert_eq!(out.risk_level, "UNKNOWN");
    }

    #[tokio::test]
    async fn batch_fallback_skips_buckets_and_explanations() {
        let registry = registry_with("fixed", Arc::new(FixedProba(0.9))).await;
        let request = BatchRequest {
            model_name: "fixed".into(),
            data: vec![record(&[("x", 1.into())]), record(&[("x", 2.into())])],
        };
        let out = predict_batch(&registry, &request).await.unwrap();
        assert_eq!(out.predictions, vec![1, 1]);
        assert!(out.probabilities.is_none());
        assert!(out.risk_levels.is_none());
        assert!(out.explanations.is_none());
    }
}
