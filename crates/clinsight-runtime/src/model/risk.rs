//! Composite patient risk scorer: three clamped sub-scores averaged together.

use super::{Capabilities, Model, ModelError, PersistedModel};
use crate::feature::Frame;
use serde::{Deserialize, Serialize};

/// 4-level bucket thresholds native to this scorer. Intentionally finer than
/// the classifier's 3-level scale; the two are never reconciled.
const CRITICAL: f64 = 0.85;
const HIGH: f64 = 0.7;
const MEDIUM: f64 = 0.4;

/// Deterministic formula evaluator over expected clinical fields.
///
/// Missing fields default to 0 before each formula is applied, and every
/// sub-score clamps at 1, so the composite always lands in [0, 1]. There is
/// no fitting step; the scorer is always considered trained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRiskScorer {}

impl PatientRiskScorer {
    pub fn new() -> Self {
        Self {}
    }

    fn field(frame: &Frame, row: usize, name: &str) -> f64 {
        frame
            .get(row, name)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// `min(1, age/100 + cholesterol/500)` per row.
    pub fn cardiovascular_risk(&self, frame: &Frame) -> Vec<f64> {
        (0..frame.len())
            .map(|row| {
                let age = Self::field(frame, row, "age");
                let cholesterol = Self::field(frame, row, "cholesterol");
                (age / 100.0 + cholesterol / 500.0).min(1.0)
            })
            .collect()
    }

    /// `min(1, glucose_level/300)` per row.
    pub fn diabetes_risk(&self, frame: &Frame) -> Vec<f64> {
        (0..frame.len())
            .map(|row| (Self::field(frame, row, "glucose_level") / 300.0).min(1.0))
            .collect()
    }

    /// `min(1, previous_admissions/8)` per row.
    pub fn readmission_risk(&self, frame: &Frame) -> Vec<f64> {
        (0..frame.len())
            .map(|row| (Self::field(frame, row, "previous_admissions") / 8.0).min(1.0))
            .collect()
    }

    /// Unweighted mean of the three sub-scores.
    pub fn composite(&self, frame: &Frame) -> Vec<f64> {
        let cv = self.cardiovascular_risk(frame);
        let di = self.diabetes_risk(frame);
        let rd = self.readmission_risk(frame);
        cv.iter()
            .zip(&di)
            .zip(&rd)
            .map(|((c, d), r)| (c + d + r) / 3.0)
            .collect()
    }

    pub fn categorize_risk_levels(&self, scores: &[f64]) -> Vec<String> {
        scores
            .iter()
            .map(|&s| {
                if s >= CRITICAL {
                    "CRITICAL"
                } else if s >= HIGH {
                    "HIGH"
                } else if s >= MEDIUM {
                    "MEDIUM"
                } else {
                    "LOW"
                }
                .to_string()
            })
            .collect()
    }
}

impl Model for PatientRiskScorer {
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
        Ok(self.composite(frame))
    }

    fn categorize(&self, scores: &[f64]) -> Result<Vec<String>, ModelError> {
        Ok(self.categorize_risk_levels(scores))
    }

    fn snapshot(&self) -> Option<PersistedModel> {
        Some(PersistedModel::RiskScorer(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{record, FeatureValue};

    #[test]
    fn composite_stays_in_unit_interval_for_extreme_inputs() {
        let frame = Frame::from_records(vec![record(&[
            ("age", 10_000.into()),
            ("cholesterol", 99_999.into()),
            ("glucose_level", 1_000_000.into()),
            ("previous_admissions", 500.into()),
        ])]);
        let scorer = PatientRiskScorer::new();
        let scores = scorer.composite(&frame);
        assert_eq!(scores, vec![1.0]);

        let frame = Frame::from_records(vec![record(&[("age", FeatureValue::Float(-50.0))])]);
        let scores = scorer.composite(&frame);
        assert!(scores[0] <= 1.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let scorer = PatientRiskScorer::new();
        let frame = Frame::from_records(vec![record(&[("unrelated", 1.into())])]);
        assert_eq!(scorer.composite(&frame), vec![0.0]);
    }

    #[test]
    fn sub_scores_follow_reference_formulas() {
        let scorer = PatientRiskScorer::new();
        let frame = Frame::from_records(vec![record(&[
            ("age", 50.into()),
            ("cholesterol", 250.into()),
            ("glucose_level", 150.into()),
            ("previous_admissions", 2.into()),
        ])]);
        assert_eq!(scorer.cardiovascular_risk(&frame), vec![1.0]);
        assert_eq!(scorer.diabetes_risk(&frame), vec![0.5]);
        assert_eq!(scorer.readmission_risk(&frame), vec![0.25]);
        let composite = scorer.composite(&frame)[0];
        assert!((composite - (1.0 + 0.5 + 0.25) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn categorize_uses_four_buckets_with_inclusive_bounds() {
        let scorer = PatientRiskScorer::new();
        let levels = scorer.categorize_risk_levels(&[0.85, 0.84999, 0.7, 0.4, 0.39999, 0.0]);
        assert_eq!(
            levels,
            vec!["CRITICAL", "HIGH", "HIGH", "MEDIUM", "LOW", "LOW"]
        );
    }

    #[test]
    fn scorer_is_always_trained() {
        assert!(PatientRiskScorer::new().is_trained());
    }

    #[test]
    fn batch_predict_is_unsupported() {
        let scorer = PatientRiskScorer::new();
        let frame = Frame::from_records(vec![record(&[("age", 1.into())])]);
        assert!(matches!(
            scorer.predict(&frame),
            Err(ModelError::Unsupported(_))
        ));
    }
}
