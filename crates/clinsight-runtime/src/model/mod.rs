//! Model trait and the two in-process model implementations.
//!
//! Capability probing from the original service ("call this method if the
//! object happens to have it") is replaced by an explicit [`Model`] trait:
//! every optional operation is a trait method with a [`Capabilities`] flag
//! resolved at registration time, and unsupported operations return
//! [`ModelError::Unsupported`] instead of failing reflection at call time.

mod no_show;
mod risk;

pub use no_show::{FitKind, NoShowPredictor};
pub use risk::PatientRiskScorer;

use crate::feature::{FeatureRecord, Frame};
use serde::{Deserialize, Serialize};

/// Errors raised while computing a prediction.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Malformed or out-of-domain input (maps to a client error).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Anything else that went wrong during prediction.
    #[error("prediction error: {0}")]
    Internal(String),
}

/// What a model can do, fixed per concrete type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// Supports `predict_proba_single` on a raw record.
    pub single_record: bool,
    /// Supports the bundled `predict_batch` output.
    pub batch_native: bool,
    /// Supports `predict_proba`.
    pub probabilities: bool,
    /// Supports `composite_risk` / `categorize`.
    pub composite_risk: bool,
    /// Produces contributing-factor explanations. Never set today; the
    /// explanation hook exists but no model implements it.
    pub explanations: bool,
}

/// Bundled output of a native batch prediction.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    pub predictions: Vec<i64>,
    pub probabilities: Option<Vec<f64>>,
    pub risk_levels: Option<Vec<String>>,
    pub explanations: Option<Vec<Option<serde_json::Value>>>,
}

/// A model held by the registry for the process lifetime.
pub trait Model: Send + Sync {
    /// Whether the model is ready to serve predictions. Models that failed a
    /// real fit may still report `true` (fail-open) while flagging the
    /// degraded state elsewhere.
    fn is_trained(&self) -> bool;

    fn capabilities(&self) -> Capabilities;

    /// Binary labels for a batch.
    fn predict(&self, frame: &Frame) -> Result<Vec<i64>, ModelError>;

    /// Probability-of-positive-class per row.
    fn predict_proba(&self, _frame: &Frame) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::Unsupported("predict_proba"))
    }

    /// Single-record probability without building a frame.
    fn predict_proba_single(&self, _record: &FeatureRecord) -> Result<f64, ModelError> {
        Err(ModelError::Unsupported("predict_proba_single"))
    }

    /// Predictions, probabilities, risk buckets and explanations in one call.
    fn predict_batch(&self, _frame: &Frame) -> Result<BatchOutput, ModelError> {
        Err(ModelError::Unsupported("predict_batch"))
    }

    /// Composite risk score per row.
    fn composite_risk(&self, _frame: &Frame) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::Unsupported("composite_risk"))
    }

    /// The model's own categorical bucketing of scores.
    fn categorize(&self, _scores: &[f64]) -> Result<Vec<String>, ModelError> {
        Err(ModelError::Unsupported("categorize"))
    }

    /// Model-reported confidence for its last family of predictions, when the
    /// implementation tracks one.
    fn confidence(&self) -> Option<f64> {
        None
    }

    /// Ordered contributing-factor labels for a record. No implementation
    /// exists yet; dispatch treats `None` as "unsupported".
    fn explain(&self, _record: &FeatureRecord) -> Option<Vec<String>> {
        None
    }

    /// Serializable state for disk persistence. `None` means the model is not
    /// persistable (e.g. test doubles registered at runtime).
    fn snapshot(&self) -> Option<PersistedModel> {
        None
    }
}

/// On-disk representation of a persistable model, one JSON file per name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum PersistedModel {
    NoShow(NoShowPredictor),
    RiskScorer(PatientRiskScorer),
}

impl PersistedModel {
    /// Rehydrate the persisted state into a live model instance.
    pub fn into_model(self) -> std::sync::Arc<dyn Model> {
        match self {
            PersistedModel::NoShow(m) => std::sync::Arc::new(m),
            PersistedModel::RiskScorer(m) => std::sync::Arc::new(m),
        }
    }
}
