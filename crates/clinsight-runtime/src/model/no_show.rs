//! No-show classifier: a trainable logistic backend with a heuristic fallback.

use super::{BatchOutput, Capabilities, Model, ModelError, PersistedModel};
use crate::feature::{FeatureRecord, FeatureValue, Frame};
use serde::{Deserialize, Serialize};

/// Probability returned for a record with no numeric values at all.
const EMPTY_RECORD_PROBA: f64 = 0.1;

/// Classification threshold for the binary label.
const LABEL_THRESHOLD: f64 = 0.5;

/// Risk buckets native to this model's batch output (3-level scale).
const BATCH_HIGH: f64 = 0.7;
const BATCH_MEDIUM: f64 = 0.4;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// How the model ended up in its current state.
///
/// `Degenerate` marks the fail-open path where no labels were supplied:
/// the model still reports trained and serves the heuristic, but the state
/// is never conflated with a genuine fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitKind {
    Heuristic,
    Fitted,
    Degenerate,
}

/// Logistic-regression coefficients over a fixed column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearBackend {
    columns: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearBackend {
    /// Fit by batch gradient descent on the logistic loss. Missing and null
    /// cells are treated as zero; a non-numeric cell fails the fit.
    fn fit(frame: &Frame, labels: &[f64]) -> Result<Self, ModelError> {
        let matrix = numeric_matrix(frame, frame.columns())?;
        if matrix.is_empty() || frame.columns().is_empty() {
            return Err(ModelError::InvalidInput("empty training frame".into()));
        }
        if matrix.len() != labels.len() {
            return Err(ModelError::InvalidInput(format!(
                "{} rows but {} labels",
                matrix.len(),
                labels.len()
            )));
        }

        let n_features = frame.columns().len();
        let n_samples = matrix.len() as f64;
        let mut weights = vec![0.0; n_features];
        let mut intercept = 0.0;
        let learning_rate = 0.01;

        for _ in 0..200 {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (row, &y) in matrix.iter().zip(labels) {
                let z = intercept + row.iter().zip(&weights).map(|(x, w)| x * w).sum::<f64>();
                let err = sigmoid(z) - y;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g / n_samples;
            }
            intercept -= learning_rate * grad_b / n_samples;
        }

        Ok(Self {
            columns: frame.columns().to_vec(),
            weights,
            intercept,
        })
    }

    fn proba_row(&self, frame: &Frame, row: usize) -> Result<f64, ModelError> {
        let mut z = self.intercept;
        for (col, w) in self.columns.iter().zip(&self.weights) {
            let x = frame.numeric_or_zero(row, col).ok_or_else(|| {
                ModelError::InvalidInput(format!("non-numeric value in column '{col}'"))
            })?;
            z += w * x;
        }
        Ok(sigmoid(z))
    }
}

/// Extract rows as dense numeric vectors over the given columns.
fn numeric_matrix(frame: &Frame, columns: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
    let mut matrix = Vec::with_capacity(frame.len());
    for row in 0..frame.len() {
        let mut vals = Vec::with_capacity(columns.len());
        for col in columns {
            let x = frame.numeric_or_zero(row, col).ok_or_else(|| {
                ModelError::InvalidInput(format!("non-numeric value in column '{col}'"))
            })?;
            vals.push(x);
        }
        matrix.push(vals);
    }
    Ok(matrix)
}

/// Binary no-show classifier.
///
/// When a fitted [`LinearBackend`] is present, batch probabilities come from
/// it; otherwise probabilities are a logistic squash of the per-row mean over
/// numeric columns, centered at 0.5. The single-record path is heuristic only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoShowPredictor {
    feature_columns: Vec<String>,
    backend: Option<LinearBackend>,
    fit: FitKind,
    trained: bool,
}

impl Default for NoShowPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl NoShowPredictor {
    pub fn new() -> Self {
        Self {
            feature_columns: Vec::new(),
            backend: None,
            fit: FitKind::Heuristic,
            trained: false,
        }
    }

    /// Train on a feature frame. Always leaves the model marked trained so
    /// the service can keep serving a default prediction (fail-open):
    ///
    /// - labels supplied and the fit succeeds: real backend, `FitKind::Fitted`
    /// - labels supplied but the fit fails: heuristic, `FitKind::Heuristic`
    /// - no labels: heuristic, `FitKind::Degenerate` — there is nothing
    ///   meaningful to fit against, and the state is flagged so it is never
    ///   mistaken for a successful fit
    pub fn train(&mut self, frame: &Frame, labels: Option<&[f64]>) {
        self.feature_columns = frame.columns().to_vec();
        match labels {
            Some(y) => match LinearBackend::fit(frame, y) {
                Ok(backend) => {
                    self.backend = Some(backend);
                    self.fit = FitKind::Fitted;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fit failed, falling back to heuristic");
                    self.backend = None;
                    self.fit = FitKind::Heuristic;
                }
            },
            None => {
                self.backend = None;
                self.fit = FitKind::Degenerate;
            }
        }
        self.trained = true;
    }

    pub fn fit_kind(&self) -> FitKind {
        self.fit
    }

    fn heuristic_proba(&self, frame: &Frame) -> Vec<f64> {
        let numeric = frame.numeric_columns();
        (0..frame.len())
            .map(|row| sigmoid(frame.row_mean(row, &numeric) - 0.5))
            .collect()
    }
}

impl Model for NoShowPredictor {
    fn is_trained(&self) -> bool {
        self.trained
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            single_record: true,
            batch_native: true,
            probabilities: true,
            ..Capabilities::default()
        }
    }

    fn predict(&self, frame: &Frame) -> Result<Vec<i64>, ModelError> {
        let probs = self.predict_proba(frame)?;
        Ok(probs
            .into_iter()
            .map(|p| i64::from(p >= LABEL_THRESHOLD))
            .collect())
    }

    fn predict_proba(&self, frame: &Frame) -> Result<Vec<f64>, ModelError> {
        match &self.backend {
            Some(backend) => (0..frame.len())
                .map(|row| backend.proba_row(frame, row))
                .collect(),
            None => Ok(self.heuristic_proba(frame)),
        }
    }

    fn predict_proba_single(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
        let vals: Vec<f64> = record.values().filter_map(FeatureValue::as_scalar).collect();
        if vals.is_empty() {
            return Ok(EMPTY_RECORD_PROBA);
        }
        let mean = vals.iter().sum::<f64>() / vals.len() as f64;
        Ok(sigmoid(mean - 0.5))
    }

    fn predict_batch(&self, frame: &Frame) -> Result<BatchOutput, ModelError> {
        let probs = self.predict_proba(frame)?;
        let predictions = probs
            .iter()
            .map(|&p| i64::from(p >= LABEL_THRESHOLD))
            .collect();
        let risk_levels = probs
            .iter()
            .map(|&p| {
                if p >= BATCH_HIGH {
                    "HIGH"
                } else if p >= BATCH_MEDIUM {
                    "MEDIUM"
                } else {
                    "LOW"
                }
                .to_string()
            })
            .collect();
        // Explanation generation is unimplemented; one null per row.
        let explanations = vec![None; probs.len()];
        Ok(BatchOutput {
            predictions,
            probabilities: Some(probs),
            risk_levels: Some(risk_levels),
            explanations: Some(explanations),
        })
    }

    fn snapshot(&self) -> Option<PersistedModel> {
        Some(PersistedModel::NoShow(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::record;

    fn seed_frame() -> Frame {
        Frame::from_records(vec![
            record(&[("age", 30.into()), ("misses", 0.into())]),
            record(&[("age", 45.into()), ("misses", 1.into())]),
            record(&[("age", 60.into()), ("misses", 2.into())]),
            record(&[("age", 22.into()), ("misses", 0.into())]),
        ])
    }

    #[test]
    fn single_record_without_numeric_values_returns_fixed_default() {
        let model = NoShowPredictor::new();
        let rec = record(&[("day", "Mon".into()), ("source", "GP".into())]);
        assert_eq!(model.predict_proba_single(&rec).unwrap(), 0.1);
    }

    #[test]
    fn single_record_counts_booleans_as_numeric() {
        let model = NoShowPredictor::new();
        let rec = record(&[("weekend", true.into())]);
        // mean = 1.0, sigmoid(0.5)
        let p = model.predict_proba_single(&rec).unwrap();
        assert!((p - sigmoid(0.5)).abs() < 1e-12);
    }

    #[test]
    fn heuristic_proba_is_monotone_in_numeric_mean() {
        let model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![
            record(&[("x", FeatureValue::Float(-2.0))]),
            record(&[("x", FeatureValue::Float(0.0))]),
            record(&[("x", FeatureValue::Float(0.5))]),
            record(&[("x", FeatureValue::Float(3.0))]),
        ]);
        let probs = model.predict_proba(&frame).unwrap();
        for pair in probs.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn heuristic_ignores_non_numeric_columns() {
        let model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![record(&[
            ("x", FeatureValue::Float(1.5)),
            ("day", "Mon".into()),
        ])]);
        let probs = model.predict_proba(&frame).unwrap();
        assert!((probs[0] - sigmoid(1.0)).abs() < 1e-12);
    }

    #[test]
    fn predict_thresholds_at_half() {
        let model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![
            // mean 0.5 -> sigmoid(0) = 0.5 -> label 1
            record(&[("x", FeatureValue::Float(0.5))]),
            // mean -1.0 -> well below 0.5 -> label 0
            record(&[("x", FeatureValue::Float(-1.0))]),
        ]);
        assert_eq!(model.predict(&frame).unwrap(), vec![1, 0]);
    }

    #[test]
    fn batch_risk_levels_use_three_buckets_with_inclusive_bounds() {
        // Drive the heuristic to exact probabilities via the inverse logit.
        fn logit(p: f64) -> f64 {
            (p / (1.0 - p)).ln() + 0.5
        }
        let model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![
            record(&[("x", FeatureValue::Float(logit(0.7)))]),
            record(&[("x", FeatureValue::Float(logit(0.4)))]),
            record(&[("x", FeatureValue::Float(logit(0.39999)))]),
        ]);
        let out = model.predict_batch(&frame).unwrap();
        let levels = out.risk_levels.unwrap();
        assert_eq!(levels[0], "HIGH");
        assert_eq!(levels[1], "MEDIUM");
        assert_eq!(levels[2], "LOW");
        // No CRITICAL bucket on the classifier scale.
        assert!(!levels.contains(&"CRITICAL".to_string()));
    }

    #[test]
    fn batch_explanations_are_null_per_row() {
        let model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![
            record(&[("x", 1.into())]),
            record(&[("x", 2.into())]),
        ]);
        let out = model.predict_batch(&frame).unwrap();
        assert_eq!(out.explanations, Some(vec![None, None]));
    }

    #[test]
    fn train_with_labels_produces_real_fit() {
        let mut model = NoShowPredictor::new();
        model.train(&seed_frame(), Some(&[0.0, 1.0, 1.0, 0.0]));
        assert!(model.is_trained());
        assert_eq!(model.fit_kind(), FitKind::Fitted);
    }

    #[test]
    fn train_without_labels_is_flagged_degenerate_but_trained() {
        let mut model = NoShowPredictor::new();
        model.train(&seed_frame(), None);
        assert!(model.is_trained());
        assert_eq!(model.fit_kind(), FitKind::Degenerate);
        // Still serves the heuristic.
        let rec = record(&[("age", 30.into())]);
        assert!(model.predict_proba_single(&rec).is_ok());
    }

    #[test]
    fn train_failure_falls_back_to_heuristic_without_raising() {
        let mut model = NoShowPredictor::new();
        let frame = Frame::from_records(vec![record(&[("day", "Mon".into())])]);
        model.train(&frame, Some(&[1.0]));
        assert!(model.is_trained());
        assert_eq!(model.fit_kind(), FitKind::Heuristic);
    }

    #[test]
    fn trained_backend_rejects_non_numeric_cells() {
        let mut model = NoShowPredictor::new();
        model.train(&seed_frame(), Some(&[0.0, 1.0, 1.0, 0.0]));
        let frame = Frame::from_records(vec![record(&[("age", "old".into())])]);
        assert!(matches!(
            model.predict_proba(&frame),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut model = NoShowPredictor::new();
        model.train(&seed_frame(), Some(&[0.0, 1.0, 1.0, 0.0]));
        let expected = model
            .predict_proba(&seed_frame())
            .unwrap();

        let snap = model.snapshot().unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        let restored: PersistedModel = serde_json::from_str(&json).unwrap();
        let restored = restored.into_model();
        assert!(restored.is_trained());
        assert_eq!(restored.predict_proba(&seed_frame()).unwrap(), expected);
    }
}
