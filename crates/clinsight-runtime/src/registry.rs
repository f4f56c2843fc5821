//! Model registry: owns the name→model mapping for the process lifetime.
//!
//! Models are loaded from per-model JSON files under the storage directory
//! when present, otherwise baseline-trained against a small synthetic seed
//! and persisted. Load, train and save all run off the cooperative scheduler
//! via `spawn_blocking` so startup and shutdown never stall request handling.

use crate::feature::{record, Frame};
use crate::model::{FitKind, Model, NoShowPredictor, PatientRiskScorer, PersistedModel};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Model names that must be present and trained for the service to be healthy.
pub const REQUIRED_MODELS: [&str; 2] = ["no_show_predictor", "risk_scorer"];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("model not found: {0}")]
    NotFound(String),
}

/// Errors from the persistence layer. Always logged, never surfaced to
/// callers: model persistence is best-effort.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Observational per-model attributes. Mutated on load, train, save and
/// retrieval; never consulted for control decisions.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ModelMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_from: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    /// How the classifier reached its trained state; distinguishes a genuine
    /// fit from the degenerate no-labels path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitKind>,
}

/// In-memory owner of all model instances.
pub struct ModelRegistry {
    storage_dir: PathBuf,
    models: RwLock<HashMap<String, Arc<dyn Model>>>,
    metadata: RwLock<HashMap<String, ModelMetadata>>,
}

impl ModelRegistry {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            models: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    fn model_file(&self, name: &str) -> PathBuf {
        self.storage_dir.join(format!("{name}.json"))
    }

    /// Load persisted models or train baselines for every required name.
    /// A failure for one model logs and continues with the others; the
    /// health check will report the gap instead of the process crashing.
    pub async fn initialize(&self) {
        info!(path = %self.storage_dir.display(), "initializing model registry");
        if let Err(e) = std::fs::create_dir_all(&self.storage_dir) {
            warn!(error = %e, path = %self.storage_dir.display(), "failed to create model storage dir");
        }

        for name in REQUIRED_MODELS {
            let path = self.model_file(name);
            let loaded = tokio::task::spawn_blocking(move || read_model_file(&path))
                .await
                .ok()
                .flatten();

            match loaded {
                Some(persisted) => {
                    info!(model = name, "loaded model from disk");
                    let fit = fit_kind_of(&persisted);
                    self.install(
                        name,
                        persisted.into_model(),
                        ModelMetadata {
                            loaded_from: Some("disk"),
                            load_time: Some(Utc::now()),
                            fit,
                            ..ModelMetadata::default()
                        },
                    )
                    .await;
                }
                None => {
                    let path = self.model_file(name);
                    let trained = tokio::task::spawn_blocking(move || {
                        let (model, snapshot) = train_baseline(name)?;
                        let saved = write_model_file(&path, &snapshot)
                            .map_err(|e| warn!(model = name, error = %e, "failed to persist baseline model"))
                            .is_ok();
                        Some((model, snapshot, saved))
                    })
                    .await;

                    match trained {
                        Ok(Some((model, snapshot, saved))) => {
                            info!(model = name, "trained baseline model");
                            let fit = fit_kind_of(&snapshot);
                            self.install(
                                name,
                                model,
                                ModelMetadata {
                                    loaded_from: Some("baseline"),
                                    load_time: Some(Utc::now()),
                                    saved_at: saved.then(Utc::now),
                                    fit,
                                    ..ModelMetadata::default()
                                },
                            )
                            .await;
                        }
                        Ok(None) => {
                            warn!(model = name, "no baseline available for model");
                        }
                        Err(e) => {
                            warn!(model = name, error = %e, "baseline training task failed");
                        }
                    }
                }
            }
        }
    }

    async fn install(&self, name: &str, model: Arc<dyn Model>, meta: ModelMetadata) {
        self.models.write().await.insert(name.to_string(), model);
        self.metadata.write().await.insert(name.to_string(), meta);
    }

    /// Register an arbitrary model. Every registered model gets a metadata
    /// entry, even if empty.
    pub async fn register(&self, name: &str, model: Arc<dyn Model>) {
        self.install(name, model, ModelMetadata::default()).await;
    }

    /// Retrieve a model by name, stamping `last_used` as a side effect.
    /// The stamp is best-effort: if the metadata lock is contended the stamp
    /// is skipped rather than delaying or failing the retrieval.
    pub async fn get_model(&self, name: &str) -> Result<Arc<dyn Model>, RegistryError> {
        let model = self
            .models
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let Ok(mut meta) = self.metadata.try_write() {
            meta.entry(name.to_string()).or_default().last_used = Some(Utc::now());
        }

        Ok(model)
    }

    /// Healthy only when every required model is present and trained.
    /// Unhealthy is a value, not an error; each failing condition is logged.
    pub async fn health_check(&self) -> bool {
        let models = self.models.read().await;
        let mut healthy = true;
        for name in REQUIRED_MODELS {
            match models.get(name) {
                None => {
                    warn!(model = name, "health check failed: required model not present");
                    healthy = false;
                }
                Some(m) if !m.is_trained() => {
                    warn!(model = name, "health check failed: model is not trained");
                    healthy = false;
                }
                Some(_) => {}
            }
        }
        healthy
    }

    pub async fn loaded_models(&self) -> Vec<String> {
        self.models.read().await.keys().cloned().collect()
    }

    pub async fn metadata(&self) -> HashMap<String, ModelMetadata> {
        self.metadata.read().await.clone()
    }

    pub async fn model_metadata(&self, name: &str) -> ModelMetadata {
        self.metadata
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Persist one model snapshot. Failures are logged, never raised.
    pub async fn save_model(&self, name: &str, snapshot: PersistedModel) {
        let path = self.model_file(name);
        let result = tokio::task::spawn_blocking(move || write_model_file(&path, &snapshot)).await;
        match result {
            Ok(Ok(())) => {
                info!(model = name, "saved model");
                if let Ok(mut meta) = self.metadata.try_write() {
                    meta.entry(name.to_string()).or_default().saved_at = Some(Utc::now());
                }
            }
            Ok(Err(e)) => warn!(model = name, error = %e, "failed to save model"),
            Err(e) => warn!(model = name, error = %e, "save task failed"),
        }
    }

    /// Persist every held model back to storage. One model's failure does
    /// not stop the remaining saves.
    pub async fn cleanup(&self) {
        let snapshots: Vec<(String, PersistedModel)> = {
            let models = self.models.read().await;
            models
                .iter()
                .filter_map(|(name, model)| model.snapshot().map(|s| (name.clone(), s)))
                .collect()
        };
        for (name, snapshot) in snapshots {
            self.save_model(&name, snapshot).await;
        }
    }
}

fn fit_kind_of(persisted: &PersistedModel) -> Option<FitKind> {
    match persisted {
        PersistedModel::NoShow(m) => Some(m.fit_kind()),
        PersistedModel::RiskScorer(_) => None,
    }
}

fn read_model_file(path: &Path) -> Option<PersistedModel> {
    if !path.exists() {
        return None;
    }
    let load = || -> Result<PersistedModel, StoreError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    };
    match load() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load model from disk");
            None
        }
    }
}

fn write_model_file(path: &Path, snapshot: &PersistedModel) -> Result<(), StoreError> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), snapshot)?;
    Ok(())
}

/// One-shot fit against the fixed synthetic seed, used only when no
/// persisted model exists.
fn train_baseline(name: &str) -> Option<(Arc<dyn Model>, PersistedModel)> {
    match name {
        "no_show_predictor" => {
            let frame = Frame::from_records(vec![
                record(&[
                    ("patient_age", 30.into()),
                    ("previous_no_shows", 0.into()),
                    ("appointment_hour", 9.into()),
                ]),
                record(&[
                    ("patient_age", 45.into()),
                    ("previous_no_shows", 1.into()),
                    ("appointment_hour", 14.into()),
                ]),
                record(&[
                    ("patient_age", 60.into()),
                    ("previous_no_shows", 2.into()),
                    ("appointment_hour", 16.into()),
                ]),
                record(&[
                    ("patient_age", 22.into()),
                    ("previous_no_shows", 0.into()),
                    ("appointment_hour", 11.into()),
                ]),
            ]);
            let mut model = NoShowPredictor::new();
            model.train(&frame, Some(&[0.0, 1.0, 1.0, 0.0]));
            let snapshot = PersistedModel::NoShow(model.clone());
            Some((Arc::new(model), snapshot))
        }
        "risk_scorer" => {
            let model = PatientRiskScorer::new();
            let snapshot = PersistedModel::RiskScorer(model.clone());
            Some((Arc::new(model), snapshot))
        }
        _ => None,
    }
}
